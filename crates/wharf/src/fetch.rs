//! C4 — RepoFetcher: clones/updates repositories concurrently, records
//! pre/post HEADs, classifies git failures.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;

use crate::cancel::CancellationToken;
use crate::errors::GitFailureKind;
use crate::git_client::GitClient;
use crate::recorder::Recorder;
use crate::types::{FetchStrategy, RepoFetchOutcome, Repository};

/// Result of a fetch pass across every configured repository.
pub struct FetchResults {
    pub outcomes: Vec<RepoFetchOutcome>,
    pub canceled: bool,
}

impl FetchResults {
    pub fn cloned(&self) -> usize {
        self.outcomes.iter().filter(|o| o.succeeded()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.succeeded()).count()
    }

    /// True iff every repository fetched cleanly and none of them actually
    /// changed — the precondition `clone_repos` hands to the early-skip hook.
    pub fn all_unchanged(&self) -> bool {
        self.failed() == 0
            && !self.outcomes.is_empty()
            && self.outcomes.iter().all(|o| !o.post_head.is_empty() && !o.updated)
    }
}

/// Fetches `repos` into `workspace_dir` with up to `workers` concurrent
/// workers (clamped to `[1, repos.len()]`). Each repository is independent;
/// cross-worker writes to the shared result vector are serialized under a
/// single mutex held only for the write-back (spec §5).
pub fn fetch_repositories(
    repos: &[Repository],
    workspace_dir: &Path,
    strategy: FetchStrategy,
    workers: usize,
    cancellation: &CancellationToken,
    git_client: &dyn GitClient,
    recorder: &dyn Recorder,
) -> FetchResults {
    if repos.is_empty() {
        return FetchResults { outcomes: Vec::new(), canceled: false };
    }

    let workers = workers.clamp(1, repos.len());
    recorder.record_configured_concurrency(workers);

    let queue: Mutex<VecDeque<&Repository>> = Mutex::new(repos.iter().collect());
    let results: Mutex<Vec<RepoFetchOutcome>> = Mutex::new(Vec::with_capacity(repos.len()));
    let canceled = std::sync::atomic::AtomicBool::new(false);

    std::thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| loop {
                if cancellation.is_canceled() {
                    canceled.store(true, std::sync::atomic::Ordering::SeqCst);
                    return;
                }
                let repo = {
                    let mut queue = queue.lock().expect("fetch queue mutex poisoned");
                    queue.pop_front()
                };
                let Some(repo) = repo else { return };

                let started = Instant::now();
                let outcome = fetch_one(repo, workspace_dir, strategy, git_client);
                recorder.record_repo_fetch(&repo.name, started.elapsed(), outcome.succeeded());

                let mut results = results.lock().expect("fetch results mutex poisoned");
                results.push(outcome);
            });
        }
    });

    let mut outcomes = results.into_inner().expect("fetch results mutex poisoned");
    outcomes.sort_by(|a, b| a.name.cmp(&b.name));

    FetchResults { outcomes, canceled: canceled.load(std::sync::atomic::Ordering::SeqCst) }
}

fn repo_dest(workspace_dir: &Path, repo: &Repository) -> PathBuf {
    workspace_dir.join(&repo.name)
}

fn fetch_one(repo: &Repository, workspace_dir: &Path, strategy: FetchStrategy, git_client: &dyn GitClient) -> RepoFetchOutcome {
    let dest = repo_dest(workspace_dir, repo);
    let branch = repo.branch().to_string();

    let resolved_is_update = match strategy {
        FetchStrategy::Fresh => false,
        FetchStrategy::Update => true,
        FetchStrategy::Auto => git_client.has_local_clone(&dest),
    };

    let pre_head = if resolved_is_update {
        git_client.read_head(&dest).unwrap_or_default()
    } else {
        String::new()
    };

    let mutate_result = if resolved_is_update {
        if strategy == FetchStrategy::Update && !git_client.has_local_clone(&dest) {
            Err(anyhow::anyhow!("no local clone exists at {}", dest.display()))
        } else {
            git_client.fetch_and_reset(&dest, &branch)
        }
    } else {
        git_client.clone_repo(&repo.clone_url, &branch, &dest)
    };

    if let Err(err) = mutate_result {
        let message = classify_error_message(&err);
        return RepoFetchOutcome {
            name: repo.name.clone(),
            local_path: dest,
            pre_head,
            post_head: String::new(),
            updated: false,
            error: Some(message),
        };
    }

    let post_head = match git_client.read_head(&dest) {
        Ok(head) => head,
        Err(err) => {
            return RepoFetchOutcome {
                name: repo.name.clone(),
                local_path: dest,
                pre_head,
                post_head: String::new(),
                updated: false,
                error: Some(classify_error_message(&err)),
            };
        }
    };

    let updated = pre_head.is_empty() || pre_head != post_head;

    RepoFetchOutcome { name: repo.name.clone(), local_path: dest, pre_head, post_head, updated, error: None }
}

fn classify_error_message(err: &anyhow::Error) -> String {
    let kind = err
        .downcast_ref::<GitFailureKind>()
        .copied()
        .unwrap_or_else(|| GitFailureKind::classify_message(&err.to_string()));
    format!("{kind:?}: {err}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn repo(name: &str) -> Repository {
        Repository {
            name: name.to_string(),
            clone_url: format!("https://example.com/{name}.git"),
            branch: "main".to_string(),
            paths: Vec::new(),
            tags: BTreeMap::new(),
            forge: None,
        }
    }

    struct FakeGitClient {
        heads: Mutex<BTreeMap<String, u32>>,
        fail_clone: Vec<String>,
    }

    impl FakeGitClient {
        fn new(fail_clone: &[&str]) -> Self {
            Self { heads: Mutex::new(BTreeMap::new()), fail_clone: fail_clone.iter().map(|s| s.to_string()).collect() }
        }
    }

    impl GitClient for FakeGitClient {
        fn clone_repo(&self, url: &str, _branch: &str, dest: &Path) -> anyhow::Result<()> {
            let name = dest.file_name().unwrap().to_string_lossy().into_owned();
            if self.fail_clone.contains(&name) {
                return Err(anyhow::anyhow!("authentication failed for {url}"));
            }
            std::fs::create_dir_all(dest)?;
            self.heads.lock().unwrap().insert(name, 1);
            Ok(())
        }

        fn fetch_and_reset(&self, dest: &Path, _branch: &str) -> anyhow::Result<()> {
            let name = dest.file_name().unwrap().to_string_lossy().into_owned();
            let mut heads = self.heads.lock().unwrap();
            let counter = heads.entry(name).or_insert(1);
            *counter += 1;
            Ok(())
        }

        fn read_head(&self, dest: &Path) -> anyhow::Result<String> {
            let name = dest.file_name().unwrap().to_string_lossy().into_owned();
            let heads = self.heads.lock().unwrap();
            Ok(heads.get(&name).map(|n| format!("sha-{n}")).unwrap_or_default())
        }

        fn has_local_clone(&self, dest: &Path) -> bool {
            let name = dest.file_name().unwrap().to_string_lossy().into_owned();
            self.heads.lock().unwrap().contains_key(&name)
        }
    }

    #[test]
    fn fresh_clone_has_empty_pre_head_and_is_updated() {
        let dir = tempfile::tempdir().unwrap();
        let client = FakeGitClient::new(&[]);
        let results = fetch_repositories(
            &[repo("a")],
            dir.path(),
            FetchStrategy::Auto,
            1,
            &CancellationToken::new(),
            &client,
            &crate::recorder::NoopRecorder,
        );
        assert_eq!(results.outcomes.len(), 1);
        let outcome = &results.outcomes[0];
        assert!(outcome.pre_head.is_empty());
        assert!(outcome.updated);
        assert!(outcome.succeeded());
    }

    #[test]
    fn partial_failure_is_recorded_per_repo() {
        let dir = tempfile::tempdir().unwrap();
        let client = FakeGitClient::new(&["bad"]);
        let results = fetch_repositories(
            &[repo("good"), repo("bad")],
            dir.path(),
            FetchStrategy::Auto,
            2,
            &CancellationToken::new(),
            &client,
            &crate::recorder::NoopRecorder,
        );
        assert_eq!(results.cloned(), 1);
        assert_eq!(results.failed(), 1);
        let bad = results.outcomes.iter().find(|o| o.name == "bad").unwrap();
        assert!(bad.error.as_ref().unwrap().contains("Auth"));
    }

    #[test]
    fn concurrency_is_clamped_to_repo_count() {
        let dir = tempfile::tempdir().unwrap();
        let client = FakeGitClient::new(&[]);
        let seen = AtomicUsize::new(0);
        let results = fetch_repositories(
            &[repo("only")],
            dir.path(),
            FetchStrategy::Auto,
            16,
            &CancellationToken::new(),
            &client,
            &crate::recorder::NoopRecorder,
        );
        seen.fetch_add(results.outcomes.len(), Ordering::SeqCst);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn pre_canceled_token_yields_no_outcomes() {
        let dir = tempfile::tempdir().unwrap();
        let client = FakeGitClient::new(&[]);
        let results = fetch_repositories(
            &[repo("a"), repo("b")],
            dir.path(),
            FetchStrategy::Auto,
            2,
            &CancellationToken::already_canceled(),
            &client,
            &crate::recorder::NoopRecorder,
        );
        assert!(results.canceled);
        assert!(results.outcomes.is_empty());
    }
}
