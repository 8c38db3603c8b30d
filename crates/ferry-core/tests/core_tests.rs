use ferry_core::{
    classify, parse_trash_dir_name, trash_dir_name, Backend, ErrorKind, FileError, Locator,
    Operation, OperationResult, ProgressEvent, ResultTally, TransferConfig, TransferError,
};

#[test]
fn test_every_scheme_is_lossless() {
    let cases = [
        ("/storage/emulated/0/DCIM/a.jpg", Backend::Local),
        ("file:///storage/a.jpg", Backend::Local),
        ("content://com.android.providers/tree/primary%3ADCIM", Backend::Scoped),
        ("smb://192.168.1.10/media/a.jpg", Backend::Smb),
        ("smb:/192.168.1.10/media/a.jpg", Backend::Smb),
        ("sftp://user@host:22/home/a.jpg", Backend::Sftp),
        ("ftp://host/pub/a.jpg", Backend::Ftp),
        ("cloud://drive/folder/a.jpg", Backend::Cloud),
        ("dropbox:/folder/a.jpg", Backend::Cloud),
        ("C:/Users/me/a.jpg", Backend::Local),
    ];

    for (raw, expected) in cases {
        assert_eq!(classify(raw), expected, "classify({raw})");
        // normalization must not change the backend
        assert_eq!(Locator::new(raw).backend(), expected, "Locator::new({raw})");
    }
}

#[test]
fn test_network_backends() {
    assert!(!Backend::Local.is_network());
    assert!(!Backend::Scoped.is_network());
    assert!(Backend::Smb.is_network());
    assert!(Backend::Cloud.is_network());
}

#[test]
fn test_locator_serde_normalizes() {
    let locator: Locator = serde_json::from_str(r#""sftp:/host/a.jpg""#).unwrap();
    assert_eq!(locator.as_str(), "sftp://host/a.jpg");
    assert_eq!(serde_json::to_string(&locator).unwrap(), r#""sftp://host/a.jpg""#);
}

#[test]
fn test_operation_serde() {
    let op = Operation::move_to(vec!["/a.jpg".into()], "smb://nas/share", true)
        .with_credentials("nas-creds");
    let json = serde_json::to_string(&op).unwrap();
    let back: Operation = serde_json::from_str(&json).unwrap();
    assert_eq!(op, back);
}

#[test]
fn test_partial_success_invariant() {
    let op = Operation::copy(
        vec!["/src/A".into(), "/src/B".into(), "/src/C".into()],
        "/dst",
        false,
    );
    let mut tally = ResultTally::new(op.total_items());
    tally.fail(FileError::new(
        &Locator::new("/src/A"),
        Some(&Locator::new("/dst/A")),
        &TransferError::already_exists("/dst/A"),
    ));
    tally.succeed(Some(Locator::new("/dst/B")));
    tally.fail(FileError::new(
        &Locator::new("/src/C"),
        None,
        &TransferError::not_found("/src/C"),
    ));

    let result = tally.finish(op.clone());
    assert_eq!(
        result.processed_count() + result.failed_count(),
        op.total_items()
    );
    let kinds: Vec<ErrorKind> = result.errors().iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![ErrorKind::AlreadyExists, ErrorKind::NotFound]);
}

#[test]
fn test_merge_results() {
    let op = Operation::move_to(vec![], "/dst", true);
    let first = OperationResult::Success {
        processed_count: 2,
        operation: op.clone(),
        produced_paths: vec!["/a/1".into(), "/a/2".into()],
    };
    let second = OperationResult::Failure {
        message: "gone".into(),
        failed_count: 1,
        errors: vec![],
    };

    let merged = OperationResult::merge(op, vec![first, second]);
    assert_eq!(merged.processed_count(), 2);
    assert_eq!(merged.failed_count(), 1);
    assert_eq!(merged.produced_paths().len(), 2);
}

#[test]
fn test_progress_percentage() {
    let event = ProgressEvent::Processing {
        current_item: "a.jpg".into(),
        index: 0,
        total: 2,
        bytes_transferred: 50,
        total_bytes: 200,
        speed_bytes_per_second: 10,
    };
    assert_eq!(event.percentage(), Some(25.0));
    assert!(!event.is_terminal());
}

#[test]
fn test_trash_names_parse() {
    let now = chrono::Utc::now();
    let name = trash_dir_name(now, "7");
    assert!(parse_trash_dir_name(&name).is_some());
    assert!(parse_trash_dir_name("trash_1_2").is_none());
}

#[test]
fn test_default_config_matches_policy() {
    let config = TransferConfig::default();
    assert_eq!(config.delete_max_attempts, 3);
    assert_eq!(config.delete_batch_size, 5);
    assert_eq!(config.batch_pause_ms, 150);
    assert_eq!(config.trash_retention_days, 7);
    assert_eq!(config.recent_trash_capacity, 50);
}
