use slack_assets_core::config::{AuthorIdentity, IngestConfig, RepositoryTarget};
use slack_assets_core::contract::{MockMessageSystem, MockRepositoryHost};
use slack_assets_core::error::{
    CommitError, ExtractError, FetchError, IngestError, NotifyError, PublishError, RepositoryError,
    ValidationError,
};
use slack_assets_core::ingest::AssetIngestor;
use slack_assets_core::model::{
    FileDescriptor, FileUploadEvent, GitCommit, GitRef, GitTree, NotificationStyle, PullRequest,
};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::{tempdir, TempDir};
use zip::write::FileOptions;

const PR_URL: &str = "https://github.com/acme/assets/pull/1";

fn write_zip(path: &Path, entries: &[(&str, &str)]) {
    let file = File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    for (name, content) in entries {
        zip.start_file(*name, FileOptions::default()).unwrap();
        zip.write_all(content.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
}

fn event(files: Vec<FileDescriptor>) -> FileUploadEvent {
    FileUploadEvent {
        channel: Some("C123".to_string()),
        user: Some("U123".to_string()),
        files,
    }
}

fn descriptor(url: &str, file_type: &str) -> FileDescriptor {
    FileDescriptor {
        id: Some("F1".to_string()),
        name: Some(format!("upload.{file_type}")),
        download_url: url.to_string(),
        file_type: file_type.to_string(),
    }
}

fn zip_event() -> FileUploadEvent {
    event(vec![descriptor("https://files.slack.com/upload.zip", "zip")])
}

fn target() -> RepositoryTarget {
    RepositoryTarget {
        owner: "acme".to_string(),
        author: AuthorIdentity {
            name: "Assets Bot".to_string(),
            email: "bot@example.com".to_string(),
        },
    }
}

fn config(scratch: &TempDir) -> IngestConfig {
    IngestConfig {
        scratch_dir: scratch.path().to_path_buf(),
        ..IngestConfig::default()
    }
}

fn entries_in(dir: &Path) -> usize {
    std::fs::read_dir(dir).unwrap().count()
}

/// Places a zip in the scratch dir and hands it out as the download result.
fn staged_download(messages: &mut MockMessageSystem, scratch: &TempDir, entries: &[(&str, &str)]) {
    let archive: PathBuf = scratch.path().join("download.zip");
    write_zip(&archive, entries);
    messages
        .expect_download_file()
        .withf(|file| file.url == "https://files.slack.com/upload.zip" && file.extension == "zip")
        .times(1)
        .returning(move |_| Ok(archive.clone()));
}

fn expect_branch_and_commit(host: &mut MockRepositoryHost) {
    host.expect_get_ref().returning(|branch| {
        if branch == "main" {
            Ok(Some(GitRef {
                branch: branch.to_string(),
                sha: "base-sha".to_string(),
            }))
        } else {
            Ok(None)
        }
    });
    host.expect_create_ref()
        .withf(|branch, sha| branch.starts_with("asset-") && sha == "base-sha")
        .times(1)
        .returning(|branch, sha| {
            Ok(GitRef {
                branch: branch.to_string(),
                sha: sha.to_string(),
            })
        });
    host.expect_get_commit().returning(|sha| {
        Ok(GitCommit {
            sha: sha.to_string(),
            tree_sha: "base-tree".to_string(),
        })
    });
}

fn expect_commit_succeeds(host: &mut MockRepositoryHost) {
    host.expect_create_commit().times(1).returning(|commit| {
        Ok(GitCommit {
            sha: "commit-sha".to_string(),
            tree_sha: commit.tree_sha,
        })
    });
    host.expect_update_ref()
        .withf(|branch, sha, force| branch.starts_with("asset-") && sha == "commit-sha" && !*force)
        .times(1)
        .returning(|branch, sha, _| {
            Ok(GitRef {
                branch: branch.to_string(),
                sha: sha.to_string(),
            })
        });
}

fn ingestor(
    messages: MockMessageSystem,
    host: MockRepositoryHost,
    scratch: &TempDir,
) -> AssetIngestor<MockMessageSystem, MockRepositoryHost> {
    AssetIngestor::new(messages, Arc::new(host), target(), config(scratch))
}

#[tokio::test]
async fn zip_upload_becomes_branch_commit_and_pull_request() {
    let scratch = tempdir().unwrap();
    let mut messages = MockMessageSystem::new();
    let mut host = MockRepositoryHost::new();

    staged_download(&mut messages, &scratch, &[("foo.txt", "hello")]);
    expect_branch_and_commit(&mut host);
    host.expect_create_tree()
        .withf(|base_tree, entries| {
            base_tree == "base-tree"
                && entries.len() == 1
                && entries[0].path == "foo.txt"
                && entries[0].content == b"hello"
        })
        .times(1)
        .returning(|_, _| {
            Ok(GitTree {
                sha: "tree-sha".to_string(),
            })
        });
    expect_commit_succeeds(&mut host);
    host.expect_create_pull_request()
        .withf(|request| {
            request.head.starts_with("acme:asset-")
                && request.base == "main"
                && request.title == ":robot: New assets"
                && request.maintainer_can_modify
        })
        .times(1)
        .returning(|_| {
            Ok(PullRequest {
                number: 1,
                html_url: PR_URL.to_string(),
            })
        });
    messages
        .expect_publish_message()
        .withf(|notification| {
            notification.style == NotificationStyle::Success
                && notification.title == "Asset processed with success"
                && notification.body.contains(PR_URL)
        })
        .times(1)
        .returning(|_| Ok(()));

    let url = ingestor(messages, host, &scratch)
        .handle_event(&zip_event())
        .await
        .expect("ingestion should succeed");

    assert_eq!(url, PR_URL);
    assert_eq!(entries_in(scratch.path()), 0, "scratch files must be removed");
}

#[tokio::test]
async fn event_without_files_is_rejected_before_download() {
    let scratch = tempdir().unwrap();
    let mut messages = MockMessageSystem::new();
    messages.expect_download_file().never();
    messages
        .expect_publish_message()
        .withf(|notification| {
            notification.style == NotificationStyle::Error
                && notification.title == "Error to process the asset"
                && notification.body == "invalid number of files. One file is required"
        })
        .times(1)
        .returning(|_| Ok(()));

    let err = ingestor(messages, MockRepositoryHost::new(), &scratch)
        .handle_event(&event(vec![]))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        IngestError::Validation(ValidationError::MinNumberOfFiles)
    ));
}

#[tokio::test]
async fn event_with_several_files_is_rejected() {
    let scratch = tempdir().unwrap();
    let mut messages = MockMessageSystem::new();
    messages.expect_download_file().never();
    messages
        .expect_publish_message()
        .withf(|notification| {
            notification.body == "invalid number of files. Only one file is allowed"
        })
        .times(1)
        .returning(|_| Ok(()));

    let files = vec![descriptor("https://a/1.zip", "zip"), descriptor("https://a/2.zip", "zip")];
    let err = ingestor(messages, MockRepositoryHost::new(), &scratch)
        .handle_event(&event(files))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        IngestError::Validation(ValidationError::MaxNumberOfFiles)
    ));
}

#[tokio::test]
async fn non_zip_upload_is_rejected_before_download() {
    let scratch = tempdir().unwrap();
    let mut messages = MockMessageSystem::new();
    messages.expect_download_file().never();
    messages
        .expect_publish_message()
        .withf(|notification| {
            notification.style == NotificationStyle::Error
                && notification.body == "invalid file format. The format allowed is only zip"
        })
        .times(1)
        .returning(|_| Ok(()));

    let err = ingestor(messages, MockRepositoryHost::new(), &scratch)
        .handle_event(&event(vec![descriptor("https://files.slack.com/logo.png", "png")]))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        IngestError::Validation(ValidationError::InvalidFileExtension)
    ));
}

#[tokio::test]
async fn underscore_entries_are_not_committed() {
    let scratch = tempdir().unwrap();
    let mut messages = MockMessageSystem::new();
    let mut host = MockRepositoryHost::new();

    staged_download(
        &mut messages,
        &scratch,
        &[("_notes.txt", "skip"), ("logo.svg", "<svg/>"), ("icons/_wip.svg", "wip")],
    );
    expect_branch_and_commit(&mut host);
    host.expect_create_tree()
        .withf(|_, entries| {
            let paths: Vec<&str> = entries.iter().map(|e| e.path.as_str()).collect();
            paths == vec!["logo.svg", "icons/_wip.svg"]
        })
        .times(1)
        .returning(|_, _| {
            Ok(GitTree {
                sha: "tree-sha".to_string(),
            })
        });
    expect_commit_succeeds(&mut host);
    host.expect_create_pull_request().returning(|_| {
        Ok(PullRequest {
            number: 2,
            html_url: PR_URL.to_string(),
        })
    });
    messages.expect_publish_message().returning(|_| Ok(()));

    ingestor(messages, host, &scratch)
        .handle_event(&zip_event())
        .await
        .expect("ingestion should succeed");
}

#[tokio::test]
async fn download_failure_is_reported_without_touching_the_repository() {
    let scratch = tempdir().unwrap();
    let mut messages = MockMessageSystem::new();
    let mut host = MockRepositoryHost::new();

    messages
        .expect_download_file()
        .times(1)
        .returning(|_| Err(FetchError::Status { status: 403 }));
    host.expect_get_ref().never();
    host.expect_create_ref().never();
    host.expect_create_tree().never();
    host.expect_create_commit().never();
    host.expect_create_pull_request().never();
    messages
        .expect_publish_message()
        .withf(|notification| {
            notification.style == NotificationStyle::Error
                && notification.body == "failed to download file: server answered 403"
        })
        .times(1)
        .returning(|_| Ok(()));

    let err = ingestor(messages, host, &scratch)
        .handle_event(&zip_event())
        .await
        .unwrap_err();

    assert!(
        matches!(err, IngestError::Fetch(FetchError::Status { status: 403 })),
        "got {err:?}"
    );
    assert_eq!(entries_in(scratch.path()), 0);
}

#[tokio::test]
async fn traversal_archive_fails_without_touching_the_repository() {
    let scratch = tempdir().unwrap();
    let mut messages = MockMessageSystem::new();
    let mut host = MockRepositoryHost::new();

    staged_download(&mut messages, &scratch, &[("../escape.txt", "pwned")]);
    host.expect_get_ref().never();
    host.expect_create_tree().never();
    messages
        .expect_publish_message()
        .withf(|notification| notification.style == NotificationStyle::Error)
        .times(1)
        .returning(|_| Ok(()));

    let err = ingestor(messages, host, &scratch)
        .handle_event(&zip_event())
        .await
        .unwrap_err();

    assert!(
        matches!(err, IngestError::Extract(ExtractError::PathTraversal { .. })),
        "got {err:?}"
    );
    assert_eq!(entries_in(scratch.path()), 0);
    assert!(!scratch.path().parent().unwrap().join("escape.txt").exists());
}

#[tokio::test]
async fn commit_failure_is_reported_and_scratch_is_cleaned() {
    let scratch = tempdir().unwrap();
    let mut messages = MockMessageSystem::new();
    let mut host = MockRepositoryHost::new();

    staged_download(&mut messages, &scratch, &[("foo.txt", "hello")]);
    expect_branch_and_commit(&mut host);
    host.expect_create_tree().returning(|_, _| {
        Err(RepositoryError::Status {
            status: 422,
            message: "tree rejected".to_string(),
        })
    });
    host.expect_create_commit().never();
    host.expect_update_ref().never();
    host.expect_create_pull_request().never();
    messages
        .expect_publish_message()
        .withf(|notification| {
            notification.style == NotificationStyle::Error
                && notification.body.contains("tree rejected")
        })
        .times(1)
        .returning(|_| Ok(()));

    let err = ingestor(messages, host, &scratch)
        .handle_event(&zip_event())
        .await
        .unwrap_err();

    assert!(
        matches!(err, IngestError::Commit(CommitError::Repository(_))),
        "got {err:?}"
    );
    assert_eq!(entries_in(scratch.path()), 0);
}

#[tokio::test]
async fn publish_failure_is_reported_and_scratch_is_cleaned() {
    let scratch = tempdir().unwrap();
    let mut messages = MockMessageSystem::new();
    let mut host = MockRepositoryHost::new();

    staged_download(&mut messages, &scratch, &[("foo.txt", "hello")]);
    expect_branch_and_commit(&mut host);
    host.expect_create_tree().returning(|_, _| {
        Ok(GitTree {
            sha: "tree-sha".to_string(),
        })
    });
    expect_commit_succeeds(&mut host);
    host.expect_create_pull_request().times(1).returning(|_| {
        Err(RepositoryError::Status {
            status: 422,
            message: "Validation Failed".to_string(),
        })
    });
    messages
        .expect_publish_message()
        .withf(|notification| notification.style == NotificationStyle::Error)
        .times(1)
        .returning(|_| Ok(()));

    let err = ingestor(messages, host, &scratch)
        .handle_event(&zip_event())
        .await
        .unwrap_err();

    assert!(
        matches!(err, IngestError::Publish(PublishError::Repository(_))),
        "got {err:?}"
    );
    assert_eq!(entries_in(scratch.path()), 0);
}

#[tokio::test]
async fn failed_success_notification_is_an_error() {
    let scratch = tempdir().unwrap();
    let mut messages = MockMessageSystem::new();
    let mut host = MockRepositoryHost::new();

    staged_download(&mut messages, &scratch, &[("foo.txt", "hello")]);
    expect_branch_and_commit(&mut host);
    host.expect_create_tree().returning(|_, _| {
        Ok(GitTree {
            sha: "tree-sha".to_string(),
        })
    });
    expect_commit_succeeds(&mut host);
    host.expect_create_pull_request().returning(|_| {
        Ok(PullRequest {
            number: 3,
            html_url: PR_URL.to_string(),
        })
    });
    messages
        .expect_publish_message()
        .times(1)
        .returning(|_| Err(NotifyError::Rejected("channel_not_found".to_string())));

    let err = ingestor(messages, host, &scratch)
        .handle_event(&zip_event())
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::Notify(_)), "got {err:?}");
    assert_eq!(entries_in(scratch.path()), 0);
}

#[tokio::test]
async fn failed_error_notification_keeps_the_run_error() {
    let scratch = tempdir().unwrap();
    let mut messages = MockMessageSystem::new();
    messages
        .expect_publish_message()
        .times(1)
        .returning(|_| Err(NotifyError::Status { status: 500 }));

    let err = ingestor(messages, MockRepositoryHost::new(), &scratch)
        .handle_event(&event(vec![]))
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::Validation(_)), "got {err:?}");
}
