use nalgebra::DVector;
use plotters::prelude::*;

/// Draw one figure with several line series over a common abscissa and
/// save it as a PNG. Used by the study driver to overlay the profiles of
/// all Reynolds numbers on a shared field plot.
pub fn plot_series(
    filename: &str,
    title: &str,
    x_label: &str,
    y_label: &str,
    x: &DVector<f64>,
    series: &[(String, DVector<f64>)],
) -> Result<(), Box<dyn std::error::Error>> {
    if series.is_empty() || x.is_empty() {
        return Ok(());
    }
    let x_min = x.min();
    let x_max = x.max();
    let mut y_min = f64::INFINITY;
    let mut y_max = f64::NEG_INFINITY;
    for (_, col) in series {
        y_min = y_min.min(col.min());
        y_max = y_max.max(col.max());
    }
    if y_min == y_max {
        y_min -= 1.0;
        y_max += 1.0;
    }
    let margin = 0.05 * (y_max - y_min);

    let root_area = BitMapBackend::new(filename, (800, 600)).into_drawing_area();
    root_area.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root_area)
        .caption(title, ("sans-serif", 40))
        .margin(10)
        .x_label_area_size(30)
        .y_label_area_size(60)
        .build_cartesian_2d(x_min..x_max, (y_min - margin)..(y_max + margin))?;

    chart.configure_mesh().x_desc(x_label).y_desc(y_label).draw()?;

    for (idx, (name, col)) in series.iter().enumerate() {
        let points: Vec<(f64, f64)> = x.iter().zip(col.iter()).map(|(&a, &b)| (a, b)).collect();
        let color = Palette99::pick(idx);
        chart
            .draw_series(LineSeries::new(points, &color))?
            .label(name.clone())
            .legend(move |(lx, ly)| {
                PathElement::new(vec![(lx, ly), (lx + 20, ly)], Palette99::pick(idx))
            });
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;
    root_area.present()?;
    Ok(())
}
