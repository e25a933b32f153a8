// Panels as CSV tables: one index column (`date` or `offset`), then one
// column per series and entity named `<series>/<entity>`. Null cells are
// empty.

use crate::loader::*;

fn cell(v: Option<f64>) -> String {
    v.map(|x| x.to_string()).unwrap_or_default()
}

fn finish(mut wtr: csv::Writer<&mut Vec<u8>>) -> LoaderResult<()> {
    wtr.flush().context(WritingOutputSnafu {
        path: "<table>".to_string(),
    })
}

pub fn render_panel(panel: &Panel, series: &[Series]) -> LoaderResult<String> {
    let mut buf: Vec<u8> = Vec::new();
    let mut wtr = csv::Writer::from_writer(&mut buf);

    let mut header: Vec<String> = vec!["date".to_string()];
    let mut columns: Vec<&[Option<f64>]> = Vec::new();
    for s in series.iter() {
        for (id, e) in panel.entities.iter() {
            if let Some(c) = e.column(*s) {
                header.push(format!("{}/{}", s, id));
                columns.push(c);
            }
        }
    }
    wtr.write_record(&header).context(WritingCsvSnafu {})?;
    for (idx, date) in panel.dates.iter().enumerate() {
        let mut row: Vec<String> = vec![date.format("%Y-%m-%d").to_string()];
        row.extend(columns.iter().map(|c| cell(c[idx])));
        wtr.write_record(&row).context(WritingCsvSnafu {})?;
    }
    finish(wtr)?;
    debug!("render_panel: {} rows, {} columns", panel.len(), header.len());
    Ok(String::from_utf8_lossy(&buf).to_string())
}

/// Renders aligned panels side by side. Each part names the series to show
/// and the panel it is read from, so every series may have its own crossing
/// dates. Shorter entities are padded with empty cells.
pub fn render_aligned(parts: &[(Series, &AlignedPanel)]) -> LoaderResult<String> {
    let mut buf: Vec<u8> = Vec::new();
    let mut wtr = csv::Writer::from_writer(&mut buf);

    let mut header: Vec<String> = vec!["offset".to_string()];
    let mut columns: Vec<&[Option<f64>]> = Vec::new();
    for (s, ap) in parts.iter() {
        for id in ap.entities.keys() {
            if let Some(c) = ap.column(id, *s) {
                header.push(format!("{}/{}", s, id));
                columns.push(c);
            }
        }
    }
    let num_rows = columns.iter().map(|c| c.len()).max().unwrap_or(0);
    wtr.write_record(&header).context(WritingCsvSnafu {})?;
    for offset in 0..num_rows {
        let mut row: Vec<String> = vec![offset.to_string()];
        row.extend(columns.iter().map(|c| cell(c.get(offset).cloned().flatten())));
        wtr.write_record(&row).context(WritingCsvSnafu {})?;
    }
    finish(wtr)?;
    debug!("render_aligned: {} rows, {} columns", num_rows, header.len());
    Ok(String::from_utf8_lossy(&buf).to_string())
}

/// Writes the table to `out`, or to the standard output when `out` is empty
/// or `stdout`.
pub fn write_output(table: &str, out: &Option<String>) -> LoaderResult<()> {
    match out.as_deref() {
        None | Some("stdout") => {
            print!("{}", table);
            Ok(())
        }
        Some(path) => {
            info!("Writing output to {:?}", path);
            fs::write(path, table).context(WritingOutputSnafu { path })
        }
    }
}
