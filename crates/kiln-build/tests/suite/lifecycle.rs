use super::{finished_helper, label, read_testdata, testdata};
use kiln_build::{
    BepBuildResultHelper, BuildResultHelper, BuildStatus, FailureKind, HelperOptions,
    ParseOptions, SessionState,
};
use tempfile::tempdir;

#[test]
fn extraction_before_build_finished_is_empty_and_not_consuming() {
    let mut helper =
        BepBuildResultHelper::for_event_file(
            testdata("java_build.json"),
            &HelperOptions::default(),
        );

    assert!(helper.build_artifacts().unwrap().is_empty());
    assert_eq!(helper.state(), SessionState::Pending);

    helper.build_finished();
    assert_eq!(helper.state(), SessionState::Resolved);
    assert_eq!(helper.build_artifacts().unwrap().len(), 3);
    assert_eq!(helper.state(), SessionState::Consumed);
}

#[test]
fn build_finished_twice_does_not_reparse() {
    let dir = tempdir().unwrap();
    let mut helper = finished_helper(dir.path(), &read_testdata("java_build.json"));
    std::fs::write(helper.event_file(), "").unwrap();
    helper.build_finished();
    assert_eq!(helper.build_artifacts().unwrap().len(), 3);
}

#[test]
fn build_result_survives_consumption() {
    let dir = tempdir().unwrap();
    let mut helper = finished_helper(dir.path(), &read_testdata("failed_build.json"));

    let result = helper.build_result().cloned().expect("build result");
    assert_eq!(result.exit_code, 1);
    assert_eq!(result.status, BuildStatus::BuildError);
    assert_eq!(
        helper.failed_targets(),
        &[label("//broken:broken"), label("//missing:dep")]
    );

    let artifacts = helper.build_artifacts().unwrap();
    assert_eq!(artifacts.len(), 1);
    assert_eq!(
        artifacts[0].relative_path(),
        "bazel-out/k8-fastbuild/bin/ok/libok.jar"
    );
    assert_eq!(helper.build_result(), Some(&result));
}

#[test]
fn interrupted_stream_is_a_truncation_failure() {
    let dir = tempdir().unwrap();
    let stream = read_testdata("java_build.json");
    let partial: String = stream.lines().take(4).map(|l| format!("{l}\n")).collect();

    let mut helper = finished_helper(dir.path(), &partial);
    let err = helper.build_artifacts().unwrap_err();
    assert_eq!(err.kind(), FailureKind::Truncated);
    assert!(helper.build_result().is_none());
}

#[test]
fn interrupted_stream_can_be_tolerated() {
    let dir = tempdir().unwrap();
    let stream = read_testdata("java_build.json");
    let partial: String = stream.lines().take(4).map(|l| format!("{l}\n")).collect();
    let path = dir.path().join("partial.json");
    std::fs::write(&path, partial).unwrap();

    let mut helper = BepBuildResultHelper::for_event_file(
        &path,
        &HelperOptions {
            parse: ParseOptions {
                require_last_message: false,
            },
            ..HelperOptions::default()
        },
    );
    helper.build_finished();
    let artifacts = helper.build_artifacts().unwrap();
    assert_eq!(artifacts.len(), 1);
}

#[test]
fn missing_event_file_is_reported() {
    let dir = tempdir().unwrap();
    let mut helper = BepBuildResultHelper::for_event_file(
        dir.path().join("never-written.json"),
        &HelperOptions::default(),
    );
    helper.build_finished();
    let err = helper.per_output_group_artifacts().unwrap_err();
    assert_eq!(err.kind(), FailureKind::Missing);
}

#[test]
fn owned_event_file_starts_empty_and_is_removed_on_drop() {
    let dir = tempdir().unwrap();
    let options = HelperOptions {
        bep_dir: Some(dir.path().join("bep")),
        ..HelperOptions::default()
    };

    let mut helper = BepBuildResultHelper::new(&options).unwrap();
    let path = helper.event_file().to_path_buf();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "");

    // A build that never wrote anything reads as an interrupted stream.
    helper.build_finished();
    assert_eq!(
        helper.build_artifacts().unwrap_err().kind(),
        FailureKind::Truncated
    );

    drop(helper);
    assert!(!path.exists());
}
