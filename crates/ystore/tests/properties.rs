//! Generative laws over the full pipeline: what you set is what you get,
//! and what you delete is gone.

mod common;

use common::store_with_modules;
use proptest::prelude::*;
use ystore::{DatastoreKind, EditOptions, ErrorCode, Value};

fn arb_leaf() -> impl Strategy<Value = (&'static str, Value)> {
    prop_oneof![
        any::<u8>().prop_map(|v| ("/test:plain", Value::Uint8(v))),
        "[a-zA-Z0-9 _.-]{0,24}".prop_map(|s| ("/test:cont/l", Value::String(s))),
        any::<u16>().prop_map(|v| ("/test:defaulted", Value::Uint16(v))),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn set_get_delete_law((xpath, value) in arb_leaf()) {
        let f = store_with_modules(&[]);
        let sess = f.conn.session_start(DatastoreKind::Running).unwrap();

        sess.set_item(xpath, Some(value.clone()), EditOptions::DEFAULT).unwrap();
        sess.apply_changes().unwrap();
        prop_assert_eq!(sess.get_item(xpath).unwrap().value, value);

        sess.delete_item(xpath, EditOptions::DEFAULT).unwrap();
        sess.apply_changes().unwrap();
        match sess.get_item(xpath) {
            // Leaves with schema defaults fall back to the default.
            Ok(item) => prop_assert!(item.default),
            Err(e) => prop_assert_eq!(e.code(), ErrorCode::NotFound),
        }
    }

    #[test]
    fn apply_is_idempotent_per_edit(v in any::<u8>()) {
        let f = store_with_modules(&[]);
        let sess = f.conn.session_start(DatastoreKind::Running).unwrap();

        sess.set_item("/test:plain", Some(Value::Uint8(v)), EditOptions::DEFAULT).unwrap();
        sess.apply_changes().unwrap();
        // The edit was consumed; a second apply commits nothing.
        sess.apply_changes().unwrap();
        prop_assert_eq!(sess.get_item("/test:plain").unwrap().value, Value::Uint8(v));
    }
}
