use super::{finished_helper, label, paths, read_testdata};
use kiln_build::{BuildResultHelper, FailureKind, OutputArtifact};
use std::collections::HashSet;
use tempfile::tempdir;

#[test]
fn output_group_union_equals_all_artifacts() {
    let stream = read_testdata("java_build.json");
    let dir = tempdir().unwrap();

    let all = finished_helper(dir.path(), &stream).build_artifacts().unwrap();
    let groups = finished_helper(dir.path(), &stream)
        .per_output_group_artifacts()
        .unwrap();

    let mut union: Vec<&OutputArtifact> = Vec::new();
    for (_, artifacts) in groups.iter() {
        for artifact in artifacts {
            if !union.contains(&artifact) {
                union.push(artifact);
            }
        }
    }
    let union: HashSet<&str> = union.iter().map(|a| a.relative_path()).collect();
    let all_paths: HashSet<&str> = paths(&all).into_iter().collect();
    assert_eq!(union, all_paths);
}

#[test]
fn target_artifacts_are_subsets_of_all_artifacts() {
    let stream = read_testdata("java_build.json");
    let dir = tempdir().unwrap();
    let all = finished_helper(dir.path(), &stream).build_artifacts().unwrap();

    for target in ["//app:app", "//lib:lib"] {
        let for_target = finished_helper(dir.path(), &stream)
            .build_artifacts_for_target(&label(target))
            .unwrap();
        assert!(!for_target.is_empty(), "{target} should have artifacts");
        for artifact in &for_target {
            assert!(all.contains(artifact), "{artifact:?} missing from all artifacts");
        }
    }
}

#[test]
fn target_artifacts_exclude_other_targets_outputs() {
    let stream = read_testdata("java_build.json");
    let dir = tempdir().unwrap();

    let app = finished_helper(dir.path(), &stream)
        .build_artifacts_for_target(&label("//app:app"))
        .unwrap();
    assert_eq!(
        paths(&app),
        vec![
            "bazel-out/k8-fastbuild/bin/app/app.jar",
            "bazel-out/k8-fastbuild/bin/app/app.debug",
        ]
    );

    let unknown = finished_helper(dir.path(), &stream)
        .build_artifacts_for_target(&label("//nope:nope"))
        .unwrap();
    assert!(unknown.is_empty());
}

#[test]
fn second_extraction_is_empty() {
    let stream = read_testdata("java_build.json");
    let dir = tempdir().unwrap();
    let mut helper = finished_helper(dir.path(), &stream);

    assert_eq!(helper.build_artifacts().unwrap().len(), 3);

    // Rewriting the file must not matter: the stream is never parsed again.
    std::fs::write(helper.event_file(), "garbage").unwrap();
    assert!(helper.build_artifacts().unwrap().is_empty());
    assert!(helper
        .build_artifacts_for_target(&label("//app:app"))
        .unwrap()
        .is_empty());
    assert!(helper.per_output_group_artifacts().unwrap().is_empty());
    assert!(helper.artifacts_for_output_group("default").unwrap().is_empty());
}

#[test]
fn malformed_stream_fails_extraction_but_not_flags() {
    let dir = tempdir().unwrap();
    let stream = "{\"id\":{\"started\":{}}}\n{not json\n";

    let mut helper = finished_helper(dir.path(), stream);
    let flags = helper.build_flags();
    let err = helper
        .build_artifacts_for_target(&label("//app:app"))
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::Malformed);
    assert_eq!(helper.build_flags(), flags);

    let mut helper = finished_helper(dir.path(), stream);
    let err = helper.per_output_group_artifacts().unwrap_err();
    assert_eq!(err.kind(), FailureKind::Malformed);
    assert!(err.to_string().contains("line 2"));
    assert!(!helper.build_flags().is_empty());

    // The failure is reported once.
    assert!(helper.per_output_group_artifacts().unwrap().is_empty());
}

#[test]
fn artifact_in_two_groups_is_listed_under_both() {
    let stream = read_testdata("java_build.json");
    let dir = tempdir().unwrap();
    let jar = "bazel-out/k8-fastbuild/bin/app/app.jar";

    let groups = finished_helper(dir.path(), &stream)
        .per_output_group_artifacts()
        .unwrap();
    assert_eq!(groups.group_names().collect::<Vec<_>>(), vec!["default", "symbols"]);
    assert!(paths(groups.get("default")).contains(&jar));
    assert!(paths(groups.get("symbols")).contains(&jar));

    let all = finished_helper(dir.path(), &stream).build_artifacts().unwrap();
    assert_eq!(paths(&all).iter().filter(|p| **p == jar).count(), 1);
}

#[test]
fn artifacts_are_deduplicated_by_path() {
    // Same path reported by two sets with different digests: still one artifact.
    let stream = concat!(
        r#"{"id":{"namedSet":{"id":"0"}},"namedSetOfFiles":{"files":[{"name":"a.txt","pathPrefix":["out"],"digest":"1"}]}}"#,
        "\n",
        r#"{"id":{"namedSet":{"id":"1"}},"namedSetOfFiles":{"files":[{"name":"a.txt","pathPrefix":["out"],"digest":"2"}]}}"#,
        "\n",
        r#"{"id":{"targetCompleted":{"label":"//:a"}},"completed":{"success":true,"outputGroup":[{"name":"default","fileSets":[{"id":"0"},{"id":"1"}]}]}}"#,
        "\n",
        r#"{"id":{"buildFinished":{}},"finished":{"exitCode":{"name":"SUCCESS"}},"lastMessage":true}"#,
        "\n",
    );
    let dir = tempdir().unwrap();
    let all = finished_helper(dir.path(), stream).build_artifacts().unwrap();
    assert_eq!(paths(&all), vec!["out/a.txt"]);
    assert_eq!(all[0].digest(), Some("1"));
}

#[test]
fn successful_build_without_artifacts_is_empty() {
    let stream = concat!(
        r#"{"id":{"started":{}},"started":{"command":"build"}}"#,
        "\n",
        r#"{"id":{"targetCompleted":{"label":"//docs:docs"}},"completed":{"success":true}}"#,
        "\n",
        r#"{"id":{"buildFinished":{}},"finished":{"exitCode":{"name":"SUCCESS"}},"lastMessage":true}"#,
        "\n",
    );
    let dir = tempdir().unwrap();
    let mut helper = finished_helper(dir.path(), stream);
    assert_eq!(helper.build_artifacts().unwrap(), Vec::<OutputArtifact>::new());
}

#[test]
fn missing_output_group_is_empty() {
    let stream = read_testdata("java_build.json");
    let dir = tempdir().unwrap();
    let mut helper = finished_helper(dir.path(), &stream);
    assert!(helper.artifacts_for_output_group("_validation").unwrap().is_empty());
}

#[test]
fn single_output_group_matches_per_group_view() {
    let stream = read_testdata("java_build.json");
    let dir = tempdir().unwrap();

    let symbols = finished_helper(dir.path(), &stream)
        .artifacts_for_output_group("symbols")
        .unwrap();
    assert_eq!(
        paths(&symbols),
        vec![
            "bazel-out/k8-fastbuild/bin/app/app.jar",
            "bazel-out/k8-fastbuild/bin/app/app.debug",
        ]
    );
}
