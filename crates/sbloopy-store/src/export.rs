use std::path::Path;

use sbloopy_core::errors::{ErrorInfo, SbError};

use crate::store::ExperimentStore;

fn export_error(path: &Path, err: impl ToString) -> SbError {
    SbError::Serde(
        ErrorInfo::new("store.export", err.to_string())
            .with_context("path", path.display().to_string()),
    )
}

/// Writes the model's training data up to `upto` at `time` as a MIDAS table.
///
/// Columns: the cell line, `TR:<stimulus>`, `TR:<inhibitor>i`, `DA:<readout>`
/// holding the timepoint and `DV:<readout>` holding the value (`NaN` when
/// missing). Returns the number of experiments written.
pub fn export_training_csv(
    store: &ExperimentStore,
    idmodel: i64,
    upto: Option<i64>,
    time: u32,
    out_path: &Path,
) -> Result<usize, SbError> {
    let setup = store.setup();
    let rows = store.training_data(idmodel, upto)?.to_rows(time)?;

    let mut header = vec![format!("TR:Model-{idmodel}:CellLine")];
    header.extend(setup.stimuli.iter().map(|s| format!("TR:{s}")));
    header.extend(setup.inhibitors.iter().map(|i| format!("TR:{i}i")));
    header.extend(setup.readouts.iter().map(|r| format!("DA:{r}")));
    header.extend(setup.readouts.iter().map(|r| format!("DV:{r}")));

    let mut wtr = csv::Writer::from_path(out_path).map_err(|err| export_error(out_path, err))?;
    wtr.write_record(&header)
        .map_err(|err| export_error(out_path, err))?;
    for row in &rows {
        let mut record = vec!["0".to_string()];
        record.extend(
            setup
                .stimuli
                .iter()
                .map(|s| row.stimuli.get(s).copied().unwrap_or(0).to_string()),
        );
        record.extend(
            setup
                .inhibitors
                .iter()
                .map(|i| row.inhibitors.get(i).copied().unwrap_or(0).to_string()),
        );
        record.extend(setup.readouts.iter().map(|_| time.to_string()));
        record.extend(setup.readouts.iter().map(|r| match row.readouts.get(r).copied().flatten() {
            Some(value) => value.to_string(),
            None => "NaN".to_string(),
        }));
        wtr.write_record(&record)
            .map_err(|err| export_error(out_path, err))?;
    }
    wtr.flush().map_err(|err| export_error(out_path, err))?;
    Ok(rows.len())
}
