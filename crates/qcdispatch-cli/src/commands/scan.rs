use crate::cli::ScanArgs;
use crate::error::{CliError, Result};
use qcdispatch::core::database::StructureDatabase;
use qcdispatch::core::io;
use qcdispatch::workflows::scan::{self, ScanParameters};
use tracing::{info, warn};

pub async fn run(args: ScanArgs) -> Result<()> {
    info!("Loading input structure from {:?}", &args.input);
    let structure = io::read_last(&args.input).map_err(|e| CliError::FileParsing {
        path: args.input.clone(),
        source: e.into(),
    })?;

    let (first, second) = scan::separate(&structure, args.axis, args.threshold)?;
    let params = ScanParameters {
        axis: args.axis,
        displacement: args.displacement,
        num_closer: args.num_closer,
        num_away: args.num_away,
    };
    let points = scan::scan(&first, &second, &params)?;

    let mut db = StructureDatabase::connect(&args.output)?;
    if !db.is_empty() {
        warn!(
            "{} already holds {} row(s); scan points are appended.",
            args.output.display(),
            db.len()
        );
    }
    let ids = scan::save_scan(&mut db, &points)?;

    println!(
        "Wrote {} scan points ({} + {} atoms, step {} A along {}) to {}",
        ids.len(),
        first.len(),
        second.len(),
        params.displacement,
        params.axis,
        args.output.display()
    );
    Ok(())
}
