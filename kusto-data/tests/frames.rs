//! Decoding of captured response payloads through the public surface.

use futures::io::Cursor;
use kusto_data::models::v2::{Frame, TableFragmentType, TableKind};
use kusto_data::operations::frame_decoder::{parse_frames_full, spawn_frame_decoder};
use kusto_data::prelude::OpKind;

const VALID_FRAMES: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/tests/inputs/v2/validFrames.json"
));

#[tokio::test]
async fn full_parse_of_captured_payload() {
    let frames = parse_frames_full(Cursor::new(VALID_FRAMES.as_bytes()))
        .await
        .expect("captured payload should parse");
    assert_eq!(frames.len(), 7);

    let Frame::DataSetHeader(header) = &frames[0] else {
        panic!("first frame must be the header");
    };
    assert!(!header.is_progressive);
    assert_eq!(header.version, "v2.0");

    let Frame::DataTable(properties) = &frames[1] else {
        panic!("second frame is the query properties table");
    };
    assert_eq!(properties.table_kind, TableKind::QueryProperties);
    assert_eq!(properties.columns.len(), 3);

    let Frame::TableHeader(primary) = &frames[2] else {
        panic!("third frame opens the primary table");
    };
    assert_eq!(primary.table_kind, TableKind::PrimaryResult);
    assert_eq!(primary.columns.len(), 10);

    let Frame::TableFragment(fragment) = &frames[3] else {
        panic!("fourth frame is a fragment");
    };
    assert_eq!(fragment.table_fragment_type, TableFragmentType::DataAppend);
    assert_eq!(fragment.rows.len(), 1);

    assert!(matches!(&frames[6], Frame::DataSetCompletion(c) if !c.has_errors));
}

#[tokio::test]
async fn streaming_parse_matches_full_parse() {
    let full = parse_frames_full(Cursor::new(VALID_FRAMES.as_bytes()))
        .await
        .unwrap();

    let mut rx = spawn_frame_decoder(Cursor::new(VALID_FRAMES.as_bytes()), OpKind::Query);
    let mut streamed = Vec::new();
    while let Some(frame) = rx.recv().await {
        streamed.push(frame.expect("frame should decode"));
    }

    assert_eq!(full, streamed);
}
