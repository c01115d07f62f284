//! CLI command implementations
//!
//! Every command loads the configuration and the schema, then resolves a
//! store over a recording connection. Nothing is sent to a database: `ddl`
//! and `hash` describe the objects a first sync would create.

use std::io::Write;

use serde_json::json;

use crate::config::StoreConfig;
use crate::ddl::render;
use crate::schema::SchemaLoader;
use crate::sql::MemoryConnection;
use crate::store::Store;

use super::args::{Command, Inputs};
use super::errors::CliResult;
use super::io::write_response;

/// Dispatch a parsed command
pub fn run_command(command: Command, out: &mut dyn Write) -> CliResult<()> {
    match command {
        Command::Ddl { inputs } => ddl(&inputs, out),
        Command::Hash { inputs } => hash(&inputs, out),
        Command::Check { inputs } => check(&inputs, out),
    }
}

fn open(inputs: &Inputs) -> CliResult<Store<MemoryConnection>> {
    let config = StoreConfig::from_file(&inputs.config)?;
    let schema = SchemaLoader::from_file(&inputs.schema)?;
    Ok(Store::open(MemoryConnection::new(), config, schema)?)
}

/// Print every CREATE statement in apply order
pub fn ddl(inputs: &Inputs, out: &mut dyn Write) -> CliResult<()> {
    let store = open(inputs)?;
    for expected in store.expected_objects() {
        writeln!(out, "{};", render::create(&expected.object))?;
        writeln!(out)?;
    }
    out.flush()?;
    Ok(())
}

/// Print `<kind>\t<name>\t<hash>` per object
pub fn hash(inputs: &Inputs, out: &mut dyn Write) -> CliResult<()> {
    let store = open(inputs)?;
    for expected in store.expected_objects() {
        let object = &expected.object;
        writeln!(
            out,
            "{}\t{}\t{}",
            object.kind().as_str(),
            object.full_name(),
            object.schema_hash().unwrap_or("-")
        )?;
    }
    out.flush()?;
    Ok(())
}

/// Validate both files and summarize the schema
pub fn check(inputs: &Inputs, out: &mut dyn Write) -> CliResult<()> {
    let store = open(inputs)?;
    let schema = store.schema();
    write_response(
        out,
        json!({
            "database": store.config().database,
            "processor_id": store.config().processor_id,
            "entities": schema.entities.len(),
            "interfaces": schema.interfaces.len(),
            "aggregations": schema.aggregations.len(),
            "objects": store.expected_objects().len(),
        }),
    )
}
