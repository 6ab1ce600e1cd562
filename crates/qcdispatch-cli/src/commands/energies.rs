use crate::cli::EnergiesArgs;
use crate::error::{CliError, Result};
use qcdispatch::workflows::energies::EnergyTable;
use std::fmt::Write;
use tracing::info;

pub async fn run(args: EnergiesArgs) -> Result<()> {
    if !args.labels.is_empty() && args.labels.len() != args.databases.len() {
        return Err(CliError::Argument(format!(
            "{} label(s) given for {} database(s)",
            args.labels.len(),
            args.databases.len()
        )));
    }

    let mut table = EnergyTable::new();
    for (i, path) in args.databases.iter().enumerate() {
        if !path.is_file() {
            return Err(CliError::Argument(format!(
                "database not found: {}",
                path.display()
            )));
        }
        info!("Reading energies from {}", path.display());
        table.add_database(path, args.labels.get(i).map(String::as_str))?;
    }

    match &args.output {
        Some(path) => {
            table.write_csv_to_path(path)?;
            println!(
                "Relative energies of {} database(s) written to: {}",
                table.series().len(),
                path.display()
            );
        }
        None => print!("{}", render_table(&table)),
    }
    Ok(())
}

/// Fixed-width text rendering of the table, energies in eV.
fn render_table(table: &EnergyTable) -> String {
    let mut out = String::new();
    write_table(table, &mut out).expect("writing to a String cannot fail");
    out
}

fn write_table(table: &EnergyTable, out: &mut impl Write) -> std::fmt::Result {
    let widths: Vec<usize> = table
        .series()
        .iter()
        .map(|s| s.label.len().max(12))
        .collect();

    write!(out, "{:>5}", "index")?;
    for (series, width) in table.series().iter().zip(&widths) {
        write!(out, "  {:>w$}", series.label, w = *width)?;
    }
    writeln!(out)?;

    for row in 0..table.rows() {
        write!(out, "{:>5}", row)?;
        for (series, width) in table.series().iter().zip(&widths) {
            match series.values.get(row) {
                Some(value) => write!(out, "  {:>w$.6}", value, w = *width)?,
                None => write!(out, "  {:>w$}", "", w = *width)?,
            }
        }
        writeln!(out)?;
    }
    Ok(())
}
