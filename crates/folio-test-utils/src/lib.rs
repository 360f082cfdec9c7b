//! Testing utilities for the Folio workspace
//!
//! Shared fixtures: datasets, figures, reproducible contexts, sample trees
//! and job scripts.

#![allow(missing_docs)]

use chrono::{TimeZone, Utc};
use folio_asset::{AssetStore, CapabilityError, Dataset, PortableFigure};
use folio_block::{BlockSpec, Context, Document, TreeBuilder};
use serde_json::json;
use std::path::{Path, PathBuf};

/// Context with a fixed creation time, for byte-stable output
pub fn fixed_context(title: &str) -> Context {
    Context::new(title)
        .with_author("test-suite")
        .with_created_at(Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap())
}

/// Dataset with columns `id`, `label`, `value` and `rows` rows
pub fn dataset_with_rows(rows: usize) -> Dataset {
    let mut data = Dataset::new(["id", "label", "value"]);
    for i in 0..rows {
        data.push_row(vec![json!(i), json!(format!("row-{i}")), json!(i as f64 * 1.5)])
            .unwrap();
    }
    data
}

/// Figure that exports a fixed spec, or fails when `fail` is set
#[derive(Debug, Clone)]
pub struct FakeFigure {
    pub spec: serde_json::Value,
    pub fail: bool,
}

impl FakeFigure {
    pub fn bar_chart() -> Self {
        Self {
            spec: json!({
                "mark": "bar",
                "data": {"values": [{"a": "A", "b": 28}, {"a": "B", "b": 55}]},
                "encoding": {"x": {"field": "a"}, "y": {"field": "b"}}
            }),
            fail: false,
        }
    }

    pub fn broken() -> Self {
        Self {
            spec: serde_json::Value::Null,
            fail: true,
        }
    }
}

impl PortableFigure for FakeFigure {
    fn library(&self) -> &str {
        "fake-plot"
    }

    fn to_portable_spec(&self) -> Result<Vec<u8>, CapabilityError> {
        if self.fail {
            return Err("figure backend crashed".into());
        }
        Ok(serde_json::to_vec(&self.spec)?)
    }
}

/// One Table block over a `rows`-row dataset followed by one Text block
pub fn table_and_text(store: &AssetStore, rows: usize) -> Document {
    let hash = store.intern_table(&dataset_with_rows(rows)).unwrap();
    let mut builder = TreeBuilder::new();
    let table = builder
        .add_block(BlockSpec::table(hash).with_caption("Sample data"))
        .unwrap();
    let text = builder
        .add_block(BlockSpec::text("## Notes\n\nGenerated by the test-suite."))
        .unwrap();
    builder
        .finalize(&[table, text], &fixed_context("Table and text"))
        .unwrap()
}

/// Document using every container kind
pub fn layout_document(store: &AssetStore) -> Document {
    let table = store.intern_table(&dataset_with_rows(3)).unwrap();
    let plot = store.intern_figure(&FakeFigure::bar_chart()).unwrap();

    let mut b = TreeBuilder::new();
    let page = b.add_block(BlockSpec::page("Overview")).unwrap();
    let group = b.add_block(BlockSpec::group(2)).unwrap();
    let select = b.add_block(BlockSpec::select().with_attr("select_type", "dropdown")).unwrap();
    let toggle = b.add_block(BlockSpec::toggle("Raw data")).unwrap();
    let children = [
        (group, b.add_block(BlockSpec::plot(plot).with_caption("Bars")).unwrap()),
        (group, b.add_block(BlockSpec::text("Left column")).unwrap()),
        (select, b.add_block(BlockSpec::text("First").with_caption("one")).unwrap()),
        (select, b.add_block(BlockSpec::text("Second").with_caption("two")).unwrap()),
        (toggle, b.add_block(BlockSpec::table(table)).unwrap()),
    ];
    for (parent, child) in children {
        b.add_child(parent, child).unwrap();
    }
    for child in [group, select, toggle] {
        b.add_child(page, child).unwrap();
    }
    let divider = b.add_block(BlockSpec::divider()).unwrap();
    b.add_child(page, divider).unwrap();

    let appendix = b.add_block(BlockSpec::page("Appendix")).unwrap();
    let embed = b
        .add_block(BlockSpec::embed("https://example.com/dashboard"))
        .unwrap();
    b.add_child(appendix, embed).unwrap();

    b.finalize(&[page, appendix], &fixed_context("Layout")).unwrap()
}

/// Write an executable shell script into `dir`
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }
    path
}

/// Script body that writes a minimal valid tree to `$FOLIO_OUTPUT`
pub fn text_tree_script(text: &str) -> String {
    let tree = json!({
        "title": "Script report",
        "blocks": [{"kind": "text", "attributes": {"text": text}}]
    });
    format!("cat > \"$FOLIO_OUTPUT\" <<'FOLIO_EOF'\n{tree}\nFOLIO_EOF")
}

/// Whether `pid` has exited, waiting up to two seconds for it
///
/// Zombies count as gone: the test container's init may never reap them.
/// Reads `/proc`, so it only answers on Linux.
pub fn process_gone(pid: &str) -> bool {
    let stat = Path::new("/proc").join(pid).join("stat");
    for _ in 0..40 {
        match std::fs::read_to_string(&stat) {
            Err(_) => return true,
            Ok(text) => {
                let state = text.rsplit_once(')').map(|(_, rest)| rest.trim_start());
                if matches!(state, Some(rest) if rest.starts_with('Z') || rest.starts_with('X')) {
                    return true;
                }
            }
        }
        std::thread::sleep(std::time::Duration::from_millis(50));
    }
    false
}
