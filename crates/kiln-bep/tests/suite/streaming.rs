use super::testdata;
use kiln_bep::{
    parse_build_event_file, BuildEvent, BuildEventReader, BuildOutputAccumulator, ParseOptions,
};
use std::io::{BufReader, Cursor};

#[test]
fn incremental_accumulation_matches_batch_parse() {
    let file = std::fs::File::open(testdata("java_build.json")).unwrap();
    let mut accumulator = BuildOutputAccumulator::new(ParseOptions::default());
    for record in BuildEventReader::new(BufReader::new(file)) {
        accumulator.observe(record.unwrap());
    }
    let streamed = accumulator.finish().unwrap();
    let batch = parse_build_event_file(&testdata("java_build.json"), ParseOptions::default())
        .unwrap();

    assert_eq!(streamed.all_files(), batch.all_files());
    assert_eq!(streamed.files_by_output_group(), batch.files_by_output_group());
}

#[test]
fn reader_skips_blank_lines_and_stops_after_error() {
    let stream = concat!(
        "\n",
        r#"{"id":{"started":{}},"started":{"uuid":"u","command":"build"}}"#,
        "\n",
        "   \n",
        "{oops\n",
        r#"{"id":{"buildFinished":{}},"lastMessage":true}"#,
        "\n",
    );

    let mut reader = BuildEventReader::new(Cursor::new(stream.as_bytes()));
    let first = reader.next().unwrap().unwrap();
    assert!(matches!(first.event, BuildEvent::Started(_)));
    assert_eq!(reader.lines_read(), 2);

    assert!(reader.next().unwrap().is_err());
    assert!(reader.next().is_none());
}
