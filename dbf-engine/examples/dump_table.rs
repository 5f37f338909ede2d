//! Debug tool to dump a .dbf table through the reader

use dbf_engine::{DbfResult, ReaderOptions, Table};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

fn main() -> DbfResult<()> {
    // DBF_LOG=debug|trace shows header and refill events
    let log_level = match std::env::var("DBF_LOG").as_deref() {
        Ok("trace") => Level::TRACE,
        Ok("debug") => Level::DEBUG,
        _ => Level::WARN,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        println!("Usage: dump_table <dbf_file> [encoding]");
        return Ok(());
    }

    let options = match args.get(2) {
        Some(label) => ReaderOptions::with_encoding_label(label)?,
        None => ReaderOptions::default(),
    };

    let table = Table::open_path(&args[1])?;
    let header = table.header()?;
    println!("=== {} ===", args[1]);
    println!("  Rows: {}", header.row_count());
    println!("  Row width: {}", header.row_width());
    println!("  Last modified: {:?}", header.last_modified());
    for column in header.columns() {
        println!(
            "  {:<11} {} size {:>3} dec {} -> {}",
            column.name(),
            column.native_type() as char,
            column.size(),
            column.decimal_count(),
            column.semantic_type()
        );
    }
    println!();

    let mut reader = table.open_reader_with(options)?;
    let mut live = 0;
    while reader.read()? {
        live += 1;
        let fields: Vec<String> = header
            .columns()
            .iter()
            .map(|column| match reader.get_value(column) {
                Ok(Some(value)) => format!("{:?}", value),
                Ok(None) => "-".to_string(),
                Err(e) => format!("<{}>", e),
            })
            .collect();
        println!("{:>6}: {}", live, fields.join(" | "));
    }
    println!("\n{} live rows", live);
    Ok(())
}
