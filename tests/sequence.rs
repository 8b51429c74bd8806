use itertools::Itertools;
use meter_model::{
    Align, MeterError, MeterSequence, RationalDuration,
};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn display_and_round_trip() {
    init();
    let mut ms = MeterSequence::new("6/8").unwrap();
    assert_eq!(ms.to_string(), "{6/8}");
    assert_eq!(ms.ratio_string(), "6/8");
    ms.partition_by_count(2, false).unwrap();
    assert_eq!(ms.to_string(), "{3/8+3/8}");
    ms.subdivide_partitions_equal(None).unwrap();
    assert_eq!(
        ms.to_string(),
        "{{1/8+1/8+1/8}+{1/8+1/8+1/8}}"
    );
    // identity survives the whole reshaping
    assert_eq!(ms.ratio_string(), "6/8");

    let summed = MeterSequence::new("2/4+3/8").unwrap();
    assert_eq!(summed.ratio_string(), "2/4+3/8");
    assert_eq!(summed.to_string(), "{2/4+3/8}");
    let reloaded =
        MeterSequence::new(&summed.ratio_string()).unwrap();
    assert_eq!(reloaded, summed);
}

#[test]
fn levels_and_flattening() {
    let mut ms = MeterSequence::new("6/8").unwrap();
    ms.partition_by_count(2, false).unwrap();
    ms.subdivide_partitions_equal(None).unwrap();
    assert_eq!(ms.depth(), 2);

    let top = ms.get_level(0);
    assert_eq!(top.len(), 2);
    assert_eq!(
        top.children()[0].duration(),
        RationalDuration::from(1.5)
    );

    let bottom = ms.get_level(1);
    assert_eq!(bottom.len(), 6);
    let expected_starts = [0.0, 0.5, 1.0, 1.5, 2.0, 2.5];
    for ((start, _), expected) in ms
        .get_level_spans(1)
        .iter()
        .zip_eq(expected_starts.iter())
    {
        assert_eq!(*start, RationalDuration::from(*expected));
    }
    assert_eq!(ms.flat().len(), 6);
}

#[test]
fn level_queries_follow_mutations() {
    let mut ms = MeterSequence::new("4/4").unwrap();
    ms.partition_by_count(4, false).unwrap();
    assert_eq!(ms.get_level_list(0, true).len(), 4);
    ms.partition_by_count(2, false).unwrap();
    assert_eq!(ms.get_level_list(0, true).len(), 2);
}

#[test]
fn offset_depth_of_hierarchy() {
    let mut ms = MeterSequence::new("6/8").unwrap();
    ms.subdivide_nested_hierarchy(2, None, true).unwrap();
    // downbeat sits on every level
    assert_eq!(
        ms.offset_to_depth(RationalDuration::zero(), Align::Start)
            .unwrap(),
        3
    );
    // second group start
    assert_eq!(
        ms.offset_to_depth(
            RationalDuration::from(1.5),
            Align::Start
        )
        .unwrap(),
        2
    );
    // plain eighth
    assert_eq!(
        ms.offset_to_depth(
            RationalDuration::from(0.5),
            Align::Start
        )
        .unwrap(),
        1
    );
    // off-grid offsets quantize to the finest level
    assert_eq!(
        ms.offset_to_depth(
            RationalDuration::from(0.6),
            Align::Quantize
        )
        .unwrap(),
        1
    );
    // the bar end only matches under end alignment
    assert!(ms
        .offset_to_depth(RationalDuration::from(3.0), Align::Start)
        .is_err());
    assert_eq!(
        ms.offset_to_depth(RationalDuration::from(3.0), Align::End)
            .unwrap(),
        3
    );
}

#[test]
fn partition_errors_are_reportable() {
    let mut ms = MeterSequence::new("5/8").unwrap();
    let err = ms.partition_by_count(4, false).unwrap_err();
    assert_eq!(
        err.to_string(),
        "no partition option with 4 parts for 5/8"
    );
    let err = ms
        .partition_by_list(&["1/4", "1/4"])
        .unwrap_err();
    assert!(matches!(err, MeterError::PartitionMismatch { .. }));
    assert!(err.to_string().contains("1/4+1/4"));
}
