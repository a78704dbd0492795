//! Shared fixtures for the integration suites.

use tempfile::TempDir;
use ystore::{Connection, ConnectionOptions, SchemaModule, SchemaNode, StoreConfig, ValueKind};

/// A store in a private temporary directory plus a connection into it.
pub struct Fixture {
    // Held for its Drop; the directory outlives every connection.
    pub dir: TempDir,
    pub conn: Connection,
}

/// The `test` module used across the suites.
pub fn test_schema() -> SchemaModule {
    SchemaModule::new(
        "test",
        vec![
            SchemaNode::container(
                "cont",
                vec![
                    SchemaNode::leaf("l", ValueKind::String),
                    SchemaNode::list(
                        "list",
                        vec!["k".to_owned()],
                        vec![
                            SchemaNode::leaf("k", ValueKind::String),
                            SchemaNode::leaf("v", ValueKind::Int32),
                        ],
                    )
                    .user_ordered(),
                    SchemaNode::leaf_list("ll", ValueKind::String).user_ordered(),
                ],
            ),
            SchemaNode::leaf("plain", ValueKind::Uint8),
            SchemaNode::leaf("extra", ValueKind::Uint8),
            SchemaNode::leaf("defaulted", ValueKind::Uint16).with_default("77"),
            SchemaNode::notification(
                "alarm",
                vec![SchemaNode::leaf("severity", ValueKind::Uint8)],
            ),
            SchemaNode::rpc(
                "reset",
                vec![SchemaNode::leaf("delay", ValueKind::Uint32)],
                vec![SchemaNode::leaf("result", ValueKind::String)],
            ),
        ],
    )
    .with_revision("2026-07-01")
}

/// A small extra module so multi-module scenarios have something to lock.
pub fn tiny_schema(name: &str) -> SchemaModule {
    SchemaModule::new(name, vec![SchemaNode::leaf("x", ValueKind::Bool)])
}

/// Open a fresh store with the `test` module (plus any extras) installed.
pub fn store_with_modules(extra: &[&str]) -> Fixture {
    let dir = TempDir::new().expect("temp dir");
    let conn = Connection::connect_with(
        StoreConfig::at(dir.path()),
        "integration-tests",
        ConnectionOptions::DEFAULT,
    )
    .expect("connect");
    conn.install_module(&test_schema(), &[]).expect("install test");
    for name in extra {
        conn.install_module(&tiny_schema(name), &[])
            .unwrap_or_else(|e| panic!("install {name}: {e}"));
    }
    Fixture { dir, conn }
}
