//! Command implementations.

use crate::cli::{parse_address, Cli, Commands};
use crate::memory::layers::MmapFileLayer;
use anyhow::{anyhow, bail, Context, Result};
use memstruct::{parse_schema_file, Descriptor, Item, MsvcProvider, Overlay, Schema, Value, View};
use std::sync::Arc;
use tracing::info;

pub fn run(cli: Cli) -> Result<()> {
    let mut schema = parse_schema_file(&cli.schema)
        .with_context(|| format!("loading schema {}", cli.schema.display()))?;
    if cli.rebase != 0 {
        info!("Rebasing schema addresses by {:#x}", cli.rebase);
        schema.rebase(cli.rebase);
    }

    match cli.cmd {
        Commands::Types => {
            print!("{}", list_types(&schema));
            Ok(())
        }
        Commands::Show { target, depth } => {
            let (overlay, _) = open_overlay(schema, &cli.dump, cli.base, false)?;
            let json = render(&overlay, &target, depth)?;
            println!("{}", serde_json::to_string_pretty(&json)?);
            Ok(())
        }
        Commands::Set {
            target,
            path,
            value,
        } => {
            let (overlay, provider) = open_overlay(schema, &cli.dump, cli.base, true)?;
            assign(&overlay, &target, &path, &value)?;
            provider.memory().flush()?;
            info!("Updated {}.{} in {}", target, path, cli.dump);
            Ok(())
        }
    }
}

fn open_overlay(
    schema: Schema,
    dump: &str,
    base: u32,
    writable: bool,
) -> Result<(Overlay, Arc<MsvcProvider<MmapFileLayer>>)> {
    let layer = MmapFileLayer::open("dump", dump, base, writable)
        .with_context(|| format!("mapping {}", dump))?;
    info!(
        "Dump {} covers {:#x}..{:#x}",
        dump,
        layer.base(),
        u64::from(layer.base()) + u64::from(layer.size())
    );
    let provider = Arc::new(MsvcProvider::new(layer).with_vtables(schema.vtables().clone()));
    let overlay = Overlay::new(Arc::new(schema), provider.clone());
    Ok((overlay, provider))
}

/// Sorted listing of the schema's types and globals.
fn list_types(schema: &Schema) -> String {
    let mut out = String::new();
    let mut types: Vec<&str> = schema.type_names().collect();
    types.sort_unstable();
    for name in types {
        let rtti = schema
            .compound(name)
            .and_then(|c| c.rtti_classname())
            .map(|r| format!(" (rtti {})", r))
            .unwrap_or_default();
        out.push_str(&format!("type {}{}\n", name, rtti));
    }
    let mut globals: Vec<_> = schema.symbols().collect();
    globals.sort_unstable_by_key(|(name, _)| *name);
    for (name, symbol) in globals {
        out.push_str(&format!(
            "global {} @ {:#x}: {}\n",
            name, symbol.address, symbol.type_name
        ));
    }
    out
}

/// Root view of `symbol` or `type@address`.
fn root<'a>(overlay: &'a Overlay, head: &str) -> Result<View<'a>> {
    match head.split_once('@') {
        Some((type_name, address)) => {
            let address = parse_address(address).map_err(anyhow::Error::msg)?;
            Ok(overlay.global(type_name, address)?)
        }
        None => Ok(overlay.symbol(head)?),
    }
}

/// Dereference pointers so that paths read through them.
fn follow(mut view: View<'_>) -> Result<View<'_>> {
    while let Descriptor::Pointer { target: Some(_) } = view.descriptor() {
        let address = view.address();
        view = view
            .deref()?
            .ok_or_else(|| anyhow!("null pointer at {:#x}", address))?;
    }
    Ok(view)
}

/// One path step: a field name, or a container index when numeric.
fn step<'a>(view: View<'a>, part: &str) -> Result<Item<'a>> {
    let view = follow(view)?;
    match part.parse::<i64>() {
        Ok(index) => view
            .index(index)?
            .ok_or_else(|| anyhow!("index {} out of range at {:#x}", index, view.address())),
        Err(_) => Ok(view.field(part)?),
    }
}

/// Walk `target[.path]` down to an item.
fn resolve<'a>(overlay: &'a Overlay, target: &str) -> Result<Item<'a>> {
    let mut parts = target.split('.');
    let head = parts.next().unwrap_or_default();
    let mut item = Item::View(root(overlay, head)?);
    for part in parts {
        item = match item {
            Item::View(view) => step(view, part)?,
            Item::Value(_) => bail!("cannot select '{}' inside a scalar in {}", part, target),
        };
    }
    Ok(item)
}

fn render(overlay: &Overlay, target: &str, depth: usize) -> Result<serde_json::Value> {
    let value = match resolve(overlay, target)? {
        Item::Value(value) => value,
        Item::View(view) => view.snapshot(depth)?,
    };
    Ok(serde_json::to_value(value)?)
}

/// Write `raw` at `target.path`. Text that is not valid JSON is written as a string.
fn assign(overlay: &Overlay, target: &str, path: &str, raw: &str) -> Result<()> {
    let json = serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::from(raw));
    let value = Value::from(json);

    let (parent, last) = match path.rsplit_once('.') {
        Some((prefix, last)) => (format!("{}.{}", target, prefix), last),
        None => (target.to_string(), path),
    };
    let parent = match resolve(overlay, &parent)? {
        Item::View(view) => follow(view)?,
        Item::Value(_) => bail!("{} is a scalar", parent),
    };
    match last.parse::<i64>() {
        Ok(index) => parent.set_index(index, &value)?,
        Err(_) => parent.set_field(last, &value)?,
    }
    Ok(())
}
