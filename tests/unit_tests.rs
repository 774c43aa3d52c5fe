use clap::Parser;
use prost::Message;
use std::fs;
use std::path::Path;

use detprep::config::{validate_factor, validate_max_k, validate_ratio};
use detprep::record::proto::{feature::Kind, Example};
use detprep::record::{
    build_example, class_id, masked_crc32c, read_records, shard_paths, ShardedRecordWriter,
};
use detprep::report::{draw_scatter, REPORT_FILE_NAME, SCATTER_FILE_NAME};
use detprep::uavdt::{convert_sequence, divide_list, parse_ground_truth, split_file_name};
use detprep::utils::write_sorted_json;
use detprep::{
    extract_boxes, load_json_annotations, read_report, run_anchor_clustering,
    run_record_creation, run_uavdt_conversion, write_report, AnchorArgs, AnnotationSet,
    BoundaryPolicy, BoxSize, Bucket, ConvertArgs, DatasetPreset, ElbowPick, Error,
    ImageAnnotations, ImageRecord, LayerAnchors, ObjectEntry, PlotOptions, RecordArgs,
    ScaleFactor, ThresholdLadder,
};

fn object(label: &str, x: f64, y: f64, width: Option<f64>, height: Option<f64>) -> ObjectEntry {
    ObjectEntry {
        label: Some(label.to_string()),
        x: Some(x),
        y: Some(y),
        width,
        height,
        ..ObjectEntry::default()
    }
}

fn image(name: &str, objects: Vec<ObjectEntry>) -> ImageRecord {
    ImageRecord {
        name: Some(name.to_string()),
        width: Some(100),
        height: Some(50),
        annotations: objects,
    }
}

fn write_json(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

#[test]
fn test_validators() {
    assert!(validate_ratio("0.75").is_ok());
    assert!(validate_ratio("1.0").is_ok());
    assert!(validate_ratio("0.0").is_err());
    assert!(validate_ratio("1.1").is_err());
    assert!(validate_ratio("abc").is_err());

    assert!(validate_max_k("2").is_ok());
    assert!(validate_max_k("1").is_err());
    assert!(validate_max_k("-3").is_err());

    assert!(validate_factor("0.46875").is_ok());
    assert!(validate_factor("0").is_err());
}

#[test]
fn test_anchor_args_defaults() {
    let args = AnchorArgs::parse_from(["anchor_clustering", "-d", "data", "-o", "out"]);

    assert_eq!(args.json_label, "annotation");
    assert_eq!(args.max_k, 10);
    assert_eq!(args.score_ratio, 0.75);
    assert_eq!(args.dataset, DatasetPreset::Caltech);
    assert_eq!(args.boundary_policy(), BoundaryPolicy::CarryForward);
    assert_eq!(args.elbow_pick(), ElbowPick::Previous);
    assert_eq!(
        args.threshold_ladder().unwrap().thresholds(),
        &[13.63, 17.64, 33.33, 75.0, 150.0, 300.0]
    );
    assert_eq!(args.scale_factor(), ScaleFactor::default());
}

#[test]
fn test_anchor_args_overrides() {
    let args = AnchorArgs::parse_from([
        "anchor_clustering",
        "-d",
        "data",
        "-o",
        "out",
        "--thresholds",
        "20,100",
        "--drop_boundary_box",
        "--keep_stopping_k",
    ]);

    assert_eq!(args.threshold_ladder().unwrap().thresholds(), &[20.0, 100.0]);
    assert_eq!(args.boundary_policy(), BoundaryPolicy::Drop);
    assert_eq!(args.elbow_pick(), ElbowPick::Current);

    let bad = AnchorArgs::parse_from(["x", "-d", "d", "-o", "o", "--thresholds", "100,20"]);
    assert!(matches!(
        bad.threshold_ladder(),
        Err(Error::InvalidThresholds(_))
    ));
}

#[test]
fn test_dataset_presets_are_valid_ladders() {
    for preset in [DatasetPreset::Caltech, DatasetPreset::Bdd] {
        assert!(ThresholdLadder::new(preset.thresholds().to_vec()).is_ok());
    }
}

#[test]
fn test_scale_factor_rounds_ties_to_even() {
    let scale = ScaleFactor::default();

    assert_eq!(scale.apply(16.0, 20.0), BoxSize::new(8.0, 12.0));
    assert_eq!(scale.apply(48.0, 36.0), BoxSize::new(22.0, 22.0));
    assert_eq!(ScaleFactor::identity().apply(3.4, 3.6), BoxSize::new(3.0, 4.0));
}

#[test]
fn test_extract_boxes_skips_incomplete_entries() {
    let mut images = ImageAnnotations::new();
    images.insert(
        "a.jpg".to_string(),
        image(
            "a.jpg",
            vec![
                object("car", 0.0, 0.0, Some(10.0), Some(20.0)),
                object("car", 0.0, 0.0, None, Some(20.0)),
                object("car", 0.0, 0.0, Some(0.0), Some(20.0)),
            ],
        ),
    );
    images.insert("b.jpg".to_string(), ImageRecord::default());
    let mut set = AnnotationSet::new();
    set.insert("set00".to_string(), images);

    let (boxes, stats) = extract_boxes(&set, ScaleFactor::identity());

    assert_eq!(boxes, vec![BoxSize::new(10.0, 20.0)]);
    assert_eq!(stats.images_seen, 2);
    assert_eq!(stats.empty_images, 1);
    assert_eq!(stats.entries_kept, 1);
    assert_eq!(stats.entries_skipped, 2);
}

#[test]
fn test_missing_fields_are_reported() {
    let entry = ObjectEntry {
        width: Some(3.0),
        ..ObjectEntry::default()
    };

    assert_eq!(entry.missing_size_fields(), vec!["height"]);
    assert_eq!(entry.missing_geometry_fields(), vec!["height", "x", "y", "label"]);
    assert_eq!(entry.size(), None);
}

#[test]
fn test_load_json_annotations() {
    let temp_dir = tempfile::tempdir().unwrap();
    let root = temp_dir.path();

    write_json(
        &root.join("set00/set00_annotation.json"),
        r#"{"img1.jpg": {"annotations": [{"width": 10, "height": 20, "label": "person"}]},
            "img2.jpg": {}}"#,
    );
    write_json(
        &root.join("set00/set00_other.json"),
        r#"{"img9.jpg": {"annotations": [{"width": 1, "height": 1}]}}"#,
    );
    write_json(
        &root.join("set01/annotation.json"),
        r#"{"img3.jpg": {"annotations": [{"width": 5, "height": null}]}}"#,
    );
    write_json(&root.join("skip.me/annotation.json"), r#"{"x.jpg": {}}"#);
    fs::write(root.join("annotation.json"), "not a folder").unwrap();

    let set = load_json_annotations(root, "annotation").unwrap();

    assert_eq!(set.keys().collect::<Vec<_>>(), vec!["set00", "set01"]);
    assert_eq!(set["set00"].len(), 2);
    assert!(set["set00"]["img2.jpg"].is_empty());
    assert_eq!(set["set00"]["img1.jpg"].annotations[0].size(), Some((10.0, 20.0)));
    assert_eq!(set["set01"]["img3.jpg"].annotations[0].missing_size_fields(), vec!["height"]);
}

#[test]
fn test_load_json_annotations_reports_bad_json() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("set00/annotation.json");
    write_json(&path, "{ broken");

    match load_json_annotations(temp_dir.path(), "annotation") {
        Err(Error::Json { path: reported, .. }) => assert_eq!(reported, path),
        other => panic!("expected a JSON error, got {:?}", other),
    }
}

#[test]
fn test_load_json_annotations_skips_odd_entries_only() {
    let temp_dir = tempfile::tempdir().unwrap();
    write_json(
        &temp_dir.path().join("set00/annotation.json"),
        r#"{
            "a.jpg": {"width": 640.0, "height": 480, "annotations": [
                {"width": 10, "height": 20, "id": "ped_1", "label": 3},
                {"width": 30, "height": 40, "category": ["x"]},
                {"width": "n/a", "height": 12},
                "not an object"
            ]},
            "b.jpg": {"name": 7, "annotations": {"width": 5}}
        }"#,
    );

    let set = load_json_annotations(temp_dir.path(), "annotation").unwrap();
    let first = &set["set00"]["a.jpg"];
    assert_eq!(first.width, Some(640));
    assert_eq!(first.height, Some(480));
    assert_eq!(first.annotations.len(), 4);
    assert_eq!(first.annotations[0].id, None);
    assert_eq!(first.annotations[0].label, None);
    assert_eq!(first.annotations[1].category, None);
    assert_eq!(first.annotations[2].missing_size_fields(), vec!["width"]);
    assert_eq!(first.annotations[3], ObjectEntry::default());
    assert!(set["set00"]["b.jpg"].is_empty());

    let (boxes, stats) = extract_boxes(&set, ScaleFactor::identity());
    assert_eq!(boxes, vec![BoxSize::new(10.0, 20.0), BoxSize::new(30.0, 40.0)]);
    assert_eq!(stats.entries_kept, 2);
    assert_eq!(stats.entries_skipped, 2);
    assert_eq!(stats.empty_images, 1);
}

#[test]
fn test_load_json_annotations_under_bracketed_root() {
    let temp_dir = tempfile::tempdir().unwrap();
    let root = temp_dir.path().join("data[1]");
    write_json(
        &root.join("set00/annotation.json"),
        r#"{"a.jpg": {"annotations": [{"width": 4, "height": 4}]}}"#,
    );

    let set = load_json_annotations(&root, "annotation").unwrap();
    assert_eq!(set["set00"]["a.jpg"].annotations.len(), 1);
}

#[test]
fn test_report_round_trip() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join(REPORT_FILE_NAME);
    let layers = vec![
        LayerAnchors {
            thresh: 13.63,
            final_centro: vec![],
        },
        LayerAnchors {
            thresh: 75.0,
            final_centro: vec![[10.5, 21.25], [33.0, 60.125]],
        },
    ];

    write_report(&path, &layers).unwrap();
    let content = fs::read_to_string(&path).unwrap();
    assert!(content.find("\"final_centro\"").unwrap() < content.find("\"thresh\"").unwrap());
    assert!(content.contains("\n        \"final_centro\""));

    let parsed = read_report(&path).unwrap();
    assert_eq!(parsed.len(), layers.len());
    for (a, b) in parsed.iter().zip(&layers) {
        assert_eq!(a.thresh, b.thresh);
        assert_eq!(a.final_centro.len(), b.final_centro.len());
        for (pa, pb) in a.final_centro.iter().zip(&b.final_centro) {
            assert!((pa[0] - pb[0]).abs() < 1e-9 && (pa[1] - pb[1]).abs() < 1e-9);
        }
    }
}

#[test]
fn test_draw_scatter_marks_centroids() {
    let options = PlotOptions::default();
    let buckets = vec![Bucket {
        threshold: 300.0,
        boxes: vec![BoxSize::new(100.0, 100.0)],
    }];
    let layers = vec![LayerAnchors {
        thresh: 300.0,
        final_centro: vec![[155.0, 155.0]],
    }];

    let plot = draw_scatter(&buckets, &layers, &options).unwrap();
    assert_eq!(plot.dimensions(), (options.size, options.size));

    // 155 is the middle of both axes
    let center = plot.get_pixel(options.size / 2, options.size / 2);
    assert_eq!(center.0, options.centroid_color);
}

#[test]
fn test_draw_scatter_rejects_degenerate_options() {
    let no_area = PlotOptions {
        size: 80,
        margin: 40,
        ..PlotOptions::default()
    };
    assert!(matches!(
        draw_scatter(&[], &[], &no_area),
        Err(Error::InvalidParameter(_))
    ));

    let no_grid = PlotOptions {
        grid_step: 0.0,
        ..PlotOptions::default()
    };
    assert!(no_grid.validate().is_err());
    assert!(PlotOptions::default().validate().is_ok());
}

#[test]
fn test_parse_ground_truth() {
    let path = Path::new("M0101_gt_whole.txt");
    let rows = parse_ground_truth(path, "1,5,10.0,20,30,40,1,0,1\n\n2,3,1,2,3,4,0,1,3\n").unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].frame, 1);
    assert_eq!(rows[0].left, 10);
    assert_eq!(rows[1].category, 3);

    match parse_ground_truth(path, "1,2,3\n") {
        Err(Error::Parse { line, .. }) => assert_eq!(line, 1),
        other => panic!("expected a parse error, got {:?}", other),
    }
}

#[test]
fn test_convert_sequence_groups_frames() {
    let path = Path::new("M0101_gt_whole.txt");
    let rows = parse_ground_truth(path, "2,7,1,2,3,4,0,0,2\n1,9,5,6,7,8,0,0,1\n1,4,0,0,10,10,0,0,3\n")
        .unwrap();
    let mut images = ImageAnnotations::new();

    convert_sequence(path, "M0101", rows, &mut images).unwrap();

    assert_eq!(
        images.keys().collect::<Vec<_>>(),
        vec!["M0101/img000001.jpg", "M0101/img000002.jpg"]
    );
    let first = &images["M0101/img000001.jpg"];
    assert_eq!(first.width, Some(1024));
    assert_eq!(first.height, Some(540));
    let ids: Vec<_> = first.annotations.iter().map(|a| a.id.unwrap()).collect();
    assert_eq!(ids, vec![4, 9]);
    assert_eq!(first.annotations[0].label.as_deref(), Some("bus"));
    assert_eq!(first.annotations[1].category.as_deref(), Some("sideways"));

    let bad = parse_ground_truth(path, "1,1,0,0,1,1,0,0,7\n").unwrap();
    assert!(matches!(
        convert_sequence(path, "M0101", bad, &mut images),
        Err(Error::UnknownCategory { id: 7, .. })
    ));
}

#[test]
fn test_divide_list_and_file_names() {
    let gt_files = vec![
        "M0101_gt_whole.txt".to_string(),
        "M0101_gt_ignore.txt".to_string(),
        "M0202_gt_whole.txt".to_string(),
        "M0303_gt_whole.txt".to_string(),
    ];
    let train = vec!["M0101_attr.txt".to_string()];
    let test = vec!["M0202_attr.txt".to_string()];

    let (train_files, test_files) = divide_list(&gt_files, &train, &test);
    assert_eq!(train_files, vec!["M0101_gt_whole.txt"]);
    assert_eq!(test_files, vec!["M0202_gt_whole.txt"]);

    assert_eq!(split_file_name("UAV-benchmark-M-VIVA.json", "train"), "UAV-benchmark-M-VIVA-train.json");
    assert_eq!(split_file_name("UAV", "test"), "UAV-test");
}

#[test]
fn test_uavdt_conversion_writes_sorted_integer_json() {
    let temp_dir = tempfile::tempdir().unwrap();
    let root = temp_dir.path();
    let gt_dir = root.join("GT");
    fs::create_dir_all(&gt_dir).unwrap();
    fs::write(gt_dir.join("M0101_gt_whole.txt"), "1,1,10,20,30,40,0,0,1\n").unwrap();
    fs::write(gt_dir.join("M0202_gt_whole.txt"), "1,1,1,2,3,4,0,0,2\n").unwrap();
    for (dir, name) in [("train", "M0101_attr.txt"), ("test", "M0202_attr.txt")] {
        fs::create_dir_all(root.join(dir)).unwrap();
        fs::write(root.join(dir).join(name), "").unwrap();
    }

    let args = ConvertArgs::parse_from([
        "uavdt2json",
        "-d",
        gt_dir.to_str().unwrap(),
        "--train_path",
        root.join("train").to_str().unwrap(),
        "--test_path",
        root.join("test").to_str().unwrap(),
    ]);
    let written = run_uavdt_conversion(&args).unwrap();
    assert_eq!(written.len(), 2);

    let content = fs::read_to_string(gt_dir.join("UAV-benchmark-M-VIVA-train.json")).unwrap();
    assert!(content.contains("\"M0101/img000001.jpg\""));
    assert!(content.contains("\"x\": 10,"));
    assert!(content.find("\"annotations\"").unwrap() < content.find("\"height\"").unwrap());

    let test: ImageAnnotations = serde_json::from_str(
        &fs::read_to_string(gt_dir.join("UAV-benchmark-M-VIVA-test.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(test["M0202/img000001.jpg"].annotations[0].label.as_deref(), Some("truck"));
}

#[test]
fn test_masked_crc32c() {
    assert_eq!(masked_crc32c(b""), 0xa282_ead8);
    assert_eq!(masked_crc32c(b"123456789"), 0xc78a_b0e5);
}

#[test]
fn test_sharded_record_writer() {
    let temp_dir = tempfile::tempdir().unwrap();
    let base = temp_dir.path().join("train.record");

    let mut writer = ShardedRecordWriter::create(&base, 3).unwrap();
    assert_eq!(writer.num_shards(), 3);
    for index in 0..7usize {
        writer.write(index, format!("record-{}", index).as_bytes()).unwrap();
    }
    let paths = writer.finish().unwrap();
    assert_eq!(paths, shard_paths(&base, 3));
    assert!(paths[0].to_string_lossy().ends_with("train.record-00000-of-00003"));

    let first: Vec<Vec<u8>> = read_records(&paths[0]).unwrap();
    assert_eq!(
        first,
        vec![b"record-0".to_vec(), b"record-3".to_vec(), b"record-6".to_vec()]
    );
    assert_eq!(read_records(&paths[2]).unwrap().len(), 2);

    let single = ShardedRecordWriter::create(&base, 1).unwrap();
    assert_eq!(single.finish().unwrap(), vec![base]);
}

#[test]
fn test_read_records_detects_corruption() {
    let temp_dir = tempfile::tempdir().unwrap();
    let base = temp_dir.path().join("one.record");
    let mut writer = ShardedRecordWriter::create(&base, 0).unwrap();
    writer.write(0, b"payload").unwrap();
    writer.finish().unwrap();

    let mut bytes = fs::read(&base).unwrap();
    bytes[14] ^= 0xff;
    fs::write(&base, bytes).unwrap();

    assert!(read_records(&base).is_err());
}

fn float_values(example: &Example, key: &str) -> Vec<f32> {
    match &example.features.as_ref().unwrap().feature[key].kind {
        Some(Kind::FloatList(list)) => list.value.clone(),
        other => panic!("{} is not a float list: {:?}", key, other),
    }
}

#[test]
fn test_build_example() {
    let temp_dir = tempfile::tempdir().unwrap();
    let image_path = temp_dir.path().join("M0101/img000001.jpg");
    fs::create_dir_all(image_path.parent().unwrap()).unwrap();
    fs::write(&image_path, [0xFF, 0xD8, 0xFF, 0xE0]).unwrap();

    let record = image(
        "M0101/img000001.jpg",
        vec![
            object("Car", 10.0, 5.0, Some(20.0), Some(10.0)),
            object("plane", 0.0, 0.0, Some(1.0), Some(1.0)),
            ObjectEntry::default(),
        ],
    );
    let example = build_example(temp_dir.path(), "unused", &record).unwrap();

    assert_eq!(float_values(&example, "image/object/bbox/xmin"), vec![0.1]);
    assert_eq!(float_values(&example, "image/object/bbox/xmax"), vec![0.3]);
    assert_eq!(float_values(&example, "image/object/bbox/ymin"), vec![0.1]);
    assert_eq!(float_values(&example, "image/object/bbox/ymax"), vec![0.3]);

    let features = &example.features.as_ref().unwrap().feature;
    match &features["image/object/class/label"].kind {
        Some(Kind::Int64List(list)) => assert_eq!(list.value, vec![1]),
        other => panic!("unexpected label feature {:?}", other),
    }
    match &features["image/encoded"].kind {
        Some(Kind::BytesList(list)) => assert_eq!(list.value[0], vec![0xFF, 0xD8, 0xFF, 0xE0]),
        other => panic!("unexpected encoded feature {:?}", other),
    }
    match &features["image/format"].kind {
        Some(Kind::BytesList(list)) => assert_eq!(list.value[0], b"jpg".to_vec()),
        other => panic!("unexpected format feature {:?}", other),
    }

    let decoded = Example::decode(example.encode_to_vec().as_slice()).unwrap();
    assert_eq!(decoded, example);
}

#[test]
fn test_class_ids() {
    assert_eq!(class_id("car"), Some(1));
    assert_eq!(class_id("TRUCK"), Some(2));
    assert_eq!(class_id("Bus"), Some(3));
    assert_eq!(class_id("person"), None);
}

#[test]
fn test_record_creation_end_to_end() {
    let temp_dir = tempfile::tempdir().unwrap();
    let root = temp_dir.path();
    for frame in 1..=3 {
        let path = root.join(format!("UAV-benchmark-M/M0101/img{:06}.jpg", frame));
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, [0xFF, 0xD8, frame as u8]).unwrap();
    }

    let mut images = ImageAnnotations::new();
    for frame in 1..=3 {
        let name = format!("M0101/img{:06}.jpg", frame);
        images.insert(
            name.clone(),
            image(&name, vec![object("car", 1.0, 1.0, Some(2.0), Some(2.0))]),
        );
    }
    fs::create_dir_all(root.join("GT_json")).unwrap();
    write_sorted_json(&root.join("GT_json/UAV-test.json"), &images).unwrap();
    write_sorted_json(&root.join("GT_json/UAV-train.json"), &ImageAnnotations::new()).unwrap();

    let args = RecordArgs::parse_from([
        "json2record",
        "-d",
        root.to_str().unwrap(),
        "--shard_number",
        "2",
    ]);
    let (count, paths) = run_record_creation(&args).unwrap();

    assert_eq!(count, 3);
    assert_eq!(paths.len(), 2);
    let total: usize = paths.iter().map(|p| read_records(p).unwrap().len()).sum();
    assert_eq!(total, 3);

    let first = read_records(&paths[0]).unwrap();
    let example = Example::decode(first[0].as_slice()).unwrap();
    match &example.features.unwrap().feature["image/filename"].kind {
        Some(Kind::BytesList(list)) => assert_eq!(list.value[0], b"M0101/img000001.jpg".to_vec()),
        other => panic!("unexpected filename feature {:?}", other),
    }
}

#[test]
fn test_anchor_clustering_end_to_end() {
    let temp_dir = tempfile::tempdir().unwrap();
    let root = temp_dir.path().join("data");
    let out = temp_dir.path().join("out");
    write_json(
        &root.join("set00/annotation.json"),
        r#"{
            "a.jpg": {"annotations": [
                {"width": 10, "height": 10}, {"width": 11, "height": 11},
                {"width": 50, "height": 50}, {"width": 51, "height": 51},
                {"width": 7}
            ]},
            "b.jpg": {}
        }"#,
    );

    let args = AnchorArgs::parse_from([
        "anchor_clustering",
        "-d",
        root.to_str().unwrap(),
        "-o",
        out.to_str().unwrap(),
        "--thresholds",
        "20,100",
        "--max_k",
        "3",
        "--wfactor",
        "1",
        "--hfactor",
        "1",
    ]);
    let layers = run_anchor_clustering(&args).unwrap();

    assert_eq!(layers.len(), 2);
    assert!(layers.iter().all(|l| l.final_centro.len() == 2));
    assert_eq!(read_report(&out.join(REPORT_FILE_NAME)).unwrap(), layers);
    assert!(out.join(SCATTER_FILE_NAME).exists());
}
