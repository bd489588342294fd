//! # Process-Wide Singletons
//!
//! `Toolkit::init` shares one registry across the process, so a second
//! toolkit cannot start while the first one lives.
//!
//! Kept in its own test binary: nothing else here touches the global
//! registry.

use std::thread;

use trellis::{CoreError, ThreadKind, ThreadKindRegistry, Toolkit, ToolkitError, TrellisConfig};

fn init_elsewhere() -> Result<(), ToolkitError> {
    thread::spawn(|| Toolkit::init(TrellisConfig::minimal()).map(|toolkit| toolkit.shutdown()))
        .join()
        .unwrap()
}

#[test]
fn second_toolkit_in_process_is_rejected_until_first_shuts_down() {
    let first = Toolkit::init(TrellisConfig::minimal()).unwrap();
    assert_eq!(ThreadKindRegistry::global().get_kind(), ThreadKind::MainUi);

    let err = init_elsewhere().unwrap_err();
    assert!(err.is_duplicate_singleton());
    assert!(matches!(
        err.core(),
        Some(CoreError::DuplicateSingleton {
            kind: ThreadKind::MainUi,
            ..
        })
    ));

    first.shutdown();
    assert_eq!(ThreadKindRegistry::global().get_kind(), ThreadKind::Anonymous);
    init_elsewhere().unwrap();
}
