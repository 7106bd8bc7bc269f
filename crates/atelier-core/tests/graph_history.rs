//! End-to-end commit graph scenarios over the in-memory fakes: the basic
//! commit/history flow, equivalence of the two history paths, depth
//! backfill, and forked-project history.

use std::collections::HashMap;
use std::sync::Arc;

use atelier_core::{CommitGraph, DepthBackfill, ForkEngine, ForkSelection, NewCommit};
use atelier_state::fakes::{MemoryBlobStore, MemoryBranchStore, MemoryCommitStore};
use atelier_state::{BlobStore, BranchStore, CommitRecord, CommitStore, ContentDigest};

type Graph = CommitGraph<Arc<MemoryCommitStore>, Arc<MemoryBranchStore>>;

fn graph_with_stores() -> (Graph, Arc<MemoryCommitStore>, Arc<MemoryBranchStore>) {
    let commits = Arc::new(MemoryCommitStore::new());
    let branches = Arc::new(MemoryBranchStore::new());
    let graph = CommitGraph::new(Arc::clone(&commits), Arc::clone(&branches));
    (graph, commits, branches)
}

fn blob(seed: &str) -> ContentDigest {
    ContentDigest::from_bytes(seed.as_bytes())
}

fn main_branch() -> Vec<String> {
    vec!["main".to_string()]
}

/// Assert the records form one linear chain from tip to root.
fn assert_linear_chain(history: &[CommitRecord]) {
    let by_id: HashMap<&str, &CommitRecord> = history
        .iter()
        .map(|c| (c.commit_id.as_str(), c))
        .collect();
    assert_eq!(by_id.len(), history.len(), "duplicate commit ids");

    let mut roots = 0;
    for commit in history {
        match &commit.parent_commit_id {
            None => roots += 1,
            Some(parent) => {
                assert!(
                    by_id.contains_key(parent.as_str()),
                    "parent {} missing from history",
                    parent.short()
                );
            }
        }
    }
    assert_eq!(roots, 1, "a linear chain has exactly one root");
}

#[tokio::test]
async fn commit_twice_then_read_history() {
    let (graph, _, _) = graph_with_stores();

    let c1 = graph
        .create_commit(NewCommit::new("p1", "main", blob("v1"), "alice", "init"))
        .await
        .unwrap();
    assert_eq!(c1.depth, Some(0));

    let branch = graph.branches().get_branch("p1", "main").await.unwrap().unwrap();
    assert_eq!(branch.latest_commit_id, Some(c1.commit_id.clone()));

    let c2 = graph
        .create_commit(NewCommit::new("p1", "main", blob("v2"), "alice", "edit"))
        .await
        .unwrap();
    assert_eq!(c2.depth, Some(1));

    let branch = graph.branches().get_branch("p1", "main").await.unwrap().unwrap();
    assert_eq!(branch.latest_commit_id, Some(c2.commit_id.clone()));

    let history = graph.history("p1", &main_branch()).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].commit_id, c2.commit_id);
    assert_eq!(history[1].commit_id, c1.commit_id);
}

#[tokio::test]
async fn both_history_paths_agree() {
    let (graph, commits, _) = graph_with_stores();

    for i in 0..5 {
        graph
            .create_commit(NewCommit::new(
                "p1",
                "main",
                blob(&format!("v{i}")),
                "alice",
                format!("rev {i}"),
            ))
            .await
            .unwrap();
    }

    // All depths cached: this is the ranged lookup.
    let fast = graph.history("p1", &main_branch()).await.unwrap();
    assert_eq!(fast.len(), 5);

    // Strip the tip's depth to force the walk.
    let tip_id = fast[0].commit_id.clone();
    let mut tip = commits.get_commit(&tip_id).await.unwrap().unwrap();
    commits.remove(&tip_id).await.unwrap();
    tip.depth = None;
    commits.insert(tip).await.unwrap();

    let walked = graph.history("p1", &main_branch()).await.unwrap();

    let fast_ids: Vec<&str> = fast.iter().map(|c| c.commit_id.as_str()).collect();
    let walked_ids: Vec<&str> = walked.iter().map(|c| c.commit_id.as_str()).collect();
    assert_eq!(fast_ids, walked_ids);
}

#[tokio::test]
async fn multi_branch_history_unions_both_lines() {
    let (graph, _, _) = graph_with_stores();

    let on_main = graph
        .create_commit(NewCommit::new("p1", "main", blob("m1"), "alice", "main work"))
        .await
        .unwrap();
    let on_exp = graph
        .create_commit(NewCommit::new(
            "p1",
            "experiment",
            blob("e1"),
            "alice",
            "experiment work",
        ))
        .await
        .unwrap();

    let history = graph
        .history("p1", &["main".to_string(), "experiment".to_string()])
        .await
        .unwrap();
    assert_eq!(history.len(), 2);
    let ids: Vec<&str> = history.iter().map(|c| c.commit_id.as_str()).collect();
    assert!(ids.contains(&on_main.commit_id.as_str()));
    assert!(ids.contains(&on_exp.commit_id.as_str()));
}

#[tokio::test]
async fn backfill_restores_depth_invariant() {
    let (graph, commits, _) = graph_with_stores();

    let c1 = graph
        .create_commit(NewCommit::new("p1", "main", blob("v1"), "alice", "init"))
        .await
        .unwrap();

    // Strip the root's depth to simulate a legacy row.
    let mut legacy = commits.get_commit(&c1.commit_id).await.unwrap().unwrap();
    commits.remove(&c1.commit_id).await.unwrap();
    legacy.depth = None;
    commits.insert(legacy).await.unwrap();

    // The next commit cannot propagate depth from an unfilled parent.
    let c2 = graph
        .create_commit(NewCommit::new("p1", "main", blob("v2"), "alice", "edit"))
        .await
        .unwrap();
    assert_eq!(c2.depth, None);

    let backfill = DepthBackfill::new(Arc::clone(&commits));
    assert_eq!(backfill.run("p1").await.unwrap(), 2);

    // Depth invariant holds for every row.
    assert_eq!(commits.get_commit(&c1.commit_id).await.unwrap().unwrap().depth, Some(0));
    assert_eq!(commits.get_commit(&c2.commit_id).await.unwrap().unwrap().depth, Some(1));

    // With depths restored, depth propagation resumes on new commits.
    let c3 = graph
        .create_commit(NewCommit::new("p1", "main", blob("v3"), "alice", "more"))
        .await
        .unwrap();
    assert_eq!(c3.depth, Some(2));

    let history = graph.history("p1", &main_branch()).await.unwrap();
    assert_eq!(history.len(), 3);
    assert_linear_chain(&history);
}

#[tokio::test]
async fn fork_shares_history_without_copying_rows() {
    let (graph, commits, branches) = graph_with_stores();
    let blobs = MemoryBlobStore::new();

    let mut last = None;
    for i in 0..3 {
        let payload = format!("source revision {i}");
        let digest = blobs.put(&payload, "alice").await.unwrap();
        last = Some(
            graph
                .create_commit(NewCommit::new("src", "main", digest, "alice", format!("rev {i}")))
                .await
                .unwrap(),
        );
    }
    let src_tip = last.unwrap();
    let commit_rows_before = commits.len();
    let blob_rows_before = blobs.len();

    let fork = ForkEngine::new(Arc::clone(&branches));
    let created = fork
        .fork("src", "dst", "bob", ForkSelection::AllBranches)
        .await
        .unwrap();
    assert_eq!(created.len(), 1);

    // Pointer copy only: the fork wrote no commit or blob rows.
    assert_eq!(commits.len(), commit_rows_before);
    assert_eq!(blobs.len(), blob_rows_before);

    let dst_main = branches.get_branch("dst", "main").await.unwrap().unwrap();
    assert_eq!(dst_main.latest_commit_id, Some(src_tip.commit_id.clone()));

    // History of the fork is the shared chain, served by the walk (the
    // ranged lookup cannot see rows recorded under the source project).
    let history = graph.history("dst", &main_branch()).await.unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].commit_id, src_tip.commit_id);
    assert_linear_chain(&history);
}

#[tokio::test]
async fn forked_branch_accepts_cross_project_parent() {
    let (graph, _, branches) = graph_with_stores();

    let src_tip = graph
        .create_commit(NewCommit::new("src", "main", blob("v1"), "alice", "init"))
        .await
        .unwrap();

    let fork = ForkEngine::new(Arc::clone(&branches));
    fork.fork(
        "src",
        "dst",
        "bob",
        ForkSelection::DefaultBranch {
            name: "main".to_string(),
        },
    )
    .await
    .unwrap();

    // First commit on the forked branch: its parent legitimately lives
    // under the source project.
    let diverged = graph
        .create_commit(NewCommit::new("dst", "main", blob("v2"), "bob", "diverge"))
        .await
        .unwrap();
    assert_eq!(diverged.parent_commit_id, Some(src_tip.commit_id.clone()));
    assert_eq!(diverged.project_id, "dst");
    assert_eq!(diverged.depth, Some(1));

    // The same works with the parent named explicitly.
    let explicit = graph
        .create_commit(
            NewCommit::new("dst", "main", blob("v3"), "bob", "explicit diverge")
                .with_parent(diverged.commit_id.clone()),
        )
        .await
        .unwrap();
    assert_eq!(explicit.parent_commit_id, Some(diverged.commit_id));

    let history = graph.history("dst", &main_branch()).await.unwrap();
    assert_eq!(history.len(), 3);
    assert_linear_chain(&history);

    // The source project's history is untouched by the fork's commits.
    let src_history = graph.history("src", &main_branch()).await.unwrap();
    assert_eq!(src_history.len(), 1);
    assert_eq!(src_history[0].commit_id, src_tip.commit_id);
}

#[tokio::test]
async fn commit_metadata_round_trips() {
    let (graph, _, _) = graph_with_stores();

    let commit = graph
        .create_commit(
            NewCommit::new("p1", "main", blob("v1"), "alice", "init")
                .with_description("first draft of the starfield sketch")
                .with_metadata("client", "web"),
        )
        .await
        .unwrap();

    let history = graph.history("p1", &main_branch()).await.unwrap();
    assert_eq!(history[0].description, commit.description);
    assert_eq!(history[0].metadata.get("client").map(String::as_str), Some("web"));
}
