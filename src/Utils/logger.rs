use csv::Writer;
use nalgebra::DVector;
use std::fs::File;
use std::io;

/// Save named profile columns over a common abscissa into a CSV file:
/// header row is the argument name followed by the column names, then one
/// row per mesh point.
pub fn save_profiles_csv(
    filename: &str,
    arg_name: &str,
    x_mesh: &DVector<f64>,
    columns: &[(String, DVector<f64>)],
) -> io::Result<()> {
    let file = File::create(filename)?;
    let mut writer = Writer::from_writer(file);

    let mut header = vec![arg_name.to_string()];
    header.extend(columns.iter().map(|(name, _)| name.clone()));
    writer.write_record(&header)?;

    for i in 0..x_mesh.len() {
        let mut row = vec![x_mesh[i].to_string()];
        for (name, col) in columns {
            debug_assert_eq!(col.len(), x_mesh.len(), "column {} length mismatch", name);
            row.push(col[i].to_string());
        }
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}
