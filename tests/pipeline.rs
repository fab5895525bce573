mod common;

use common::{Harness, Options, URL};
use scribepress::pipeline::StageOutcome;
use scribepress::{CollaboratorError, PublisherError};

const ARTIFACTS: [&str; 9] = [
    "abc123.wav",
    "abc123.txt",
    "abc123_summary.txt",
    "abc123_title.txt",
    "abc123_teaser.txt",
    "abc123_cta.txt",
    "abc123.jpg",
    "abc123_composed.jpg",
    "abc123_post.json",
];

#[tokio::test]
async fn test_end_to_end_on_empty_directory() {
    let harness = Harness::new();
    let job = harness.job().await;

    let report = harness.pipeline().run(&job).await.unwrap();

    assert!(!report.is_degraded());
    for name in ARTIFACTS {
        assert!(harness.artifact(name).exists(), "{} missing", name);
    }
    assert_eq!(
        std::fs::read(harness.artifact("abc123_composed.jpg")).unwrap(),
        b"cover+play"
    );
    assert_eq!(
        *harness.images.urls.lock().unwrap(),
        vec!["https://img.youtube.com/vi/abc123/maxresdefault.jpg"]
    );

    let drafts = harness.publisher.drafts();
    assert_eq!(drafts.len(), 1);
    let draft = &drafts[0];
    assert_eq!(draft.title, "Generated title");
    assert_eq!(draft.feature_image, "https://blog.example/content/images/abc123_composed.jpg");
    assert_eq!(draft.codeinjection_head, "<style>figure.gh-article-image {display:none;}</style>");

    let order: Vec<usize> = ["Generated title", URL, "Generated teaser", "Generated summary", "Generated cta"]
        .iter()
        .map(|part| draft.html.find(part).unwrap())
        .collect();
    assert!(order.windows(2).all(|pair| pair[0] < pair[1]), "{}", draft.html);

    let receipt: serde_json::Value =
        serde_json::from_slice(&std::fs::read(harness.artifact("abc123_post.json")).unwrap()).unwrap();
    assert_eq!(receipt["draft"]["id"], "post-1");
}

#[tokio::test]
async fn test_collaborators_run_in_dependency_order() {
    let harness = Harness::new();
    let job = harness.job().await;

    harness.pipeline().run(&job).await.unwrap();

    assert!(harness.position("fetch") < harness.position("transcode"));
    assert!(harness.position("transcode") < harness.position("transcribe"));
    assert!(harness.position("transcribe") < harness.position("generate:summary"));
    assert!(harness.position("transcribe") < harness.position("image"));
    for field in ["generate:title", "generate:teaser", "generate:cta"] {
        assert!(harness.position("generate:summary") < harness.position(field));
        assert!(harness.position(field) < harness.position("draft"));
    }
    assert!(harness.position("compose") < harness.position("upload"));
    assert!(harness.position("upload") < harness.position("draft"));
}

#[tokio::test]
async fn test_prompt_receives_sanitized_transcript() {
    let harness = Harness::new();
    let job = harness.job().await;

    harness.pipeline().run(&job).await.unwrap();

    let prompts = harness.text.prompts.lock().unwrap();
    // The digits go and the line break becomes a space next to the existing one
    assert!(prompts.contains(&"SUMMARY Hello World  this is the transcript".to_string()));
    assert!(prompts.contains(&"TITLE Generated summary".to_string()));
}

#[tokio::test]
async fn test_second_run_reuses_artifacts() {
    let harness = Harness::new();
    let job = harness.job().await;

    harness.pipeline().run(&job).await.unwrap();
    let first: Vec<Vec<u8>> = ARTIFACTS[..8]
        .iter()
        .map(|name| std::fs::read(harness.artifact(name)).unwrap())
        .collect();

    let report = harness.pipeline().run(&job).await.unwrap();

    for entry in [
        "fetch",
        "transcode",
        "transcribe",
        "generate:summary",
        "generate:title",
        "generate:teaser",
        "generate:cta",
        "image",
        "compose",
    ] {
        assert_eq!(harness.calls(entry), 1, "{} ran again", entry);
    }
    assert_eq!(report.outcome("summary"), Some(&StageOutcome::Reused));

    let second: Vec<Vec<u8>> = ARTIFACTS[..8]
        .iter()
        .map(|name| std::fs::read(harness.artifact(name)).unwrap())
        .collect();
    assert_eq!(first, second);

    // Publication is not idempotent
    assert_eq!(harness.publisher.drafts().len(), 2);
}

#[tokio::test]
async fn test_teaser_failure_is_absorbed() {
    let harness = Harness::new();
    harness.text.fail("teaser");
    let job = harness.job().await;

    let report = harness.pipeline().run(&job).await.unwrap();

    assert!(report.is_degraded());
    assert!(matches!(report.outcome("teaser"), Some(StageOutcome::Fallback { .. })));
    assert!(!harness.artifact("abc123_teaser.txt").exists());

    let drafts = harness.publisher.drafts();
    assert_eq!(drafts.len(), 1);
    assert!(drafts[0].html.contains("Failed to generate summary"));
    assert!(drafts[0].html.contains("Generated summary"));
}

#[tokio::test]
async fn test_summary_fallback_is_retried_next_run() {
    let harness = Harness::new();
    harness.text.fail("summary");
    let job = harness.job().await;

    let report = harness.pipeline().run(&job).await.unwrap();

    assert!(harness
        .text
        .prompts
        .lock()
        .unwrap()
        .contains(&"TITLE Failed to generate summary".to_string()));
    assert_eq!(report.outcome("title"), Some(&StageOutcome::Derived));
    for name in ["abc123_summary.txt", "abc123_title.txt", "abc123_teaser.txt", "abc123_cta.txt"] {
        assert!(!harness.artifact(name).exists(), "{} was committed", name);
    }
    assert_eq!(harness.publisher.drafts()[0].title, "abc123");

    harness.text.recover();
    let report = harness.pipeline().run(&job).await.unwrap();

    assert!(!report.is_degraded());
    for field in ["generate:summary", "generate:title", "generate:teaser", "generate:cta"] {
        assert_eq!(harness.calls(field), 2, "{} was not regenerated", field);
    }
    assert!(harness
        .text
        .prompts
        .lock()
        .unwrap()
        .contains(&"TITLE Generated summary".to_string()));
    assert_eq!(
        std::fs::read_to_string(harness.artifact("abc123_summary.txt")).unwrap(),
        "Generated summary"
    );
    assert_eq!(
        std::fs::read_to_string(harness.artifact("abc123_title.txt")).unwrap(),
        "Generated title"
    );
    assert_eq!(harness.publisher.drafts()[1].title, "Generated title");
}

#[tokio::test]
async fn test_failed_title_falls_back_to_identifier() {
    let harness = Harness::new();
    harness.text.fail("title");
    let job = harness.job().await;

    harness.pipeline().run(&job).await.unwrap();

    assert_eq!(harness.publisher.drafts()[0].title, "abc123");
}

#[tokio::test]
async fn test_without_title_prompt_post_uses_identifier() {
    let harness = Harness::with_options(Options {
        title_prompt: false,
        ..Options::default()
    });
    let job = harness.job().await;

    let report = harness.pipeline().run(&job).await.unwrap();

    assert_eq!(report.outcome("title"), None);
    assert_eq!(harness.calls("generate:title"), 0);
    let drafts = harness.publisher.drafts();
    assert_eq!(drafts[0].title, "abc123");
    assert!(drafts[0].html.starts_with(&format!("<p>{}</p>", URL)));
}

#[tokio::test]
async fn test_speech_failure_is_fatal() {
    let harness = Harness::with_options(Options {
        fail_speech: true,
        ..Options::default()
    });
    let job = harness.job().await;

    let err = harness.pipeline().run(&job).await.unwrap_err();

    match &err {
        PublisherError::Stage {
            stage,
            cause: CollaboratorError::Transcription(_),
        } => assert_eq!(stage, "transcription"),
        other => panic!("unexpected error: {}", other),
    }
    assert!(err.to_string().contains("transcription"));
    assert_eq!(err.exit_code(), 1);

    let log = harness.log.lock().unwrap().clone();
    assert_eq!(log, vec!["fetch", "transcode", "transcribe"]);
    assert!(harness.artifact("abc123.wav").exists());
    assert!(!harness.artifact("abc123.txt").exists());
    assert!(harness.publisher.drafts().is_empty());
}

#[tokio::test]
async fn test_publish_failure_still_completes() {
    let harness = Harness::new();
    harness.publisher.fail();
    let job = harness.job().await;

    let report = harness.pipeline().run(&job).await.unwrap();

    match report.outcome("publication") {
        Some(StageOutcome::Failed { error }) => assert!(error.contains("401 Unauthorized")),
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert!(harness.artifact("abc123_composed.jpg").exists());
    assert!(!harness.artifact("abc123_post.json").exists());
}

#[tokio::test]
async fn test_cancelled_job_runs_nothing() {
    let harness = Harness::new();
    let job = harness.job().await;
    let pipeline = harness.pipeline();

    pipeline.cancel_handle().cancel();
    let err = pipeline.run(&job).await.unwrap_err();

    assert!(matches!(err, PublisherError::Cancelled { .. }));
    assert!(harness.log.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_leaves_no_temporary_files() {
    let harness = Harness::new();
    let job = harness.job().await;

    harness.pipeline().run(&job).await.unwrap();

    let mut names: Vec<String> = std::fs::read_dir(harness.dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    let mut expected: Vec<String> = ARTIFACTS.iter().map(|name| name.to_string()).collect();
    expected.sort();
    assert_eq!(names, expected);
}
