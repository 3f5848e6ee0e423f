use super::testdata;
use kiln_bep::{parse_build_event_file, parse_build_events, BepError, ParseOptions};
use std::io::Cursor;

fn parse(stream: &str) -> Result<kiln_bep::ParsedBuildOutput, BepError> {
    parse_build_events(Cursor::new(stream.as_bytes()), ParseOptions::default())
}

#[test]
fn missing_file_is_reported() {
    let err = parse_build_event_file(&testdata("does-not-exist.json"), ParseOptions::default())
        .unwrap_err();
    assert!(matches!(err, BepError::Missing { .. }));
}

#[test]
fn stream_without_last_message_is_truncated() {
    let full = std::fs::read_to_string(testdata("java_build.json")).unwrap();
    let cut: String = full.lines().take(5).map(|l| format!("{l}\n")).collect();

    let err = parse(&cut).unwrap_err();
    assert!(matches!(err, BepError::Truncated { events: 5 }), "{err}");
}

#[test]
fn truncation_can_be_tolerated() {
    let full = std::fs::read_to_string(testdata("java_build.json")).unwrap();
    let cut: String = full.lines().take(4).map(|l| format!("{l}\n")).collect();

    let parsed = parse_build_events(
        Cursor::new(cut.as_bytes()),
        ParseOptions {
            require_last_message: false,
        },
    )
    .unwrap();
    assert_eq!(parsed.all_files().len(), 1);
    assert!(parsed.build_result().is_none());
}

#[test]
fn line_cut_mid_record_is_malformed() {
    let full = std::fs::read_to_string(testdata("java_build.json")).unwrap();
    let third = full.lines().nth(2).unwrap();
    let stream = format!(
        "{}\n{}\n{}",
        full.lines().next().unwrap(),
        full.lines().nth(1).unwrap(),
        &third[..third.len() / 2]
    );

    let err = parse(&stream).unwrap_err();
    assert!(matches!(err, BepError::Malformed { line: 3, .. }), "{err}");
}

#[test]
fn non_json_garbage_is_malformed() {
    let err = parse("this is not a build event stream\n").unwrap_err();
    assert!(matches!(err, BepError::Malformed { line: 1, .. }));
    assert!(err.to_string().starts_with("malformed build event on line 1"));
}

#[test]
fn invalid_utf8_is_malformed() {
    let bytes: &[u8] = b"{\"id\":{\"started\":{}}}\n\xff\xfe\n";
    let err = parse_build_events(Cursor::new(bytes), ParseOptions::default()).unwrap_err();
    assert!(matches!(err, BepError::Malformed { line: 2, .. }), "{err}");
}

#[test]
fn dangling_file_set_reference_is_reported() {
    let err = parse(concat!(
        r#"{"id":{"targetCompleted":{"label":"//a:a"}},"completed":{"success":true,"outputGroup":[{"name":"default","fileSets":[{"id":"42"}]}]}}"#,
        "\n",
        r#"{"id":{"buildFinished":{}},"finished":{"exitCode":{"name":"SUCCESS"}},"lastMessage":true}"#,
        "\n",
    ))
    .unwrap_err();
    assert!(matches!(err, BepError::UnknownFileSet { ref id } if id == "42"));
}

#[test]
fn events_after_last_message_are_ignored() {
    let parsed = parse(concat!(
        r#"{"id":{"buildFinished":{}},"finished":{"exitCode":{"name":"SUCCESS"}},"lastMessage":true}"#,
        "\n",
        r#"{"id":{"namedSet":{"id":"0"}},"namedSetOfFiles":{"files":[{"name":"late.txt"}]}}"#,
        "\n",
        r#"{"id":{"targetCompleted":{"label":"//late:late"}},"completed":{"success":true,"outputGroup":[{"name":"default","fileSets":[{"id":"0"}]}]}}"#,
        "\n",
    ))
    .unwrap();
    assert_eq!(parsed.event_count(), 1);
    assert!(parsed.all_files().is_empty());
}
