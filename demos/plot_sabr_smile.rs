// Example: plot_sabr_smile.rs
// Calibrates every tenor of a tenor × strike vol table, prints the fit summary
// and writes an SVG comparing market vols with the calibrated SABR smile for
// one tenor.
//
// Usage:
//     cargo run --example plot_sabr_smile -- <csv_path> [tenor_years]
//
// The CSV layout is the one read by `load_dataset` (see tests/data/black_vol.csv);
// bare cells are read as percent points. Set RUST_LOG=sabr_surface=debug for
// per-tenor logs. The chart is written to sabr_smile.svg.

use std::env;
use std::error::Error;

use plotters::prelude::*;
use sabr_surface::{
    default_configs, get_full_surface, get_smile, load_dataset, CalibrationParams, DatasetSchema,
};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!(
            "Usage: {} <csv_file> [tenor_years]\nExample: {} tests/data/black_vol.csv 5",
            args[0], args[0]
        );
        std::process::exit(1);
    }
    let csv_path = &args[1];
    let tenor: f64 = match args.get(2) {
        Some(text) => text.parse()?,
        None => 5.0,
    };

    let dataset = load_dataset(csv_path, &DatasetSchema::percent_points())?;
    println!(
        "Loaded {} tenors x {} strikes",
        dataset.len(),
        dataset.strikes().len()
    );

    let config = default_configs::production();
    let calib_params = CalibrationParams::default();

    // Whole surface first, so failures across tenors are visible
    let build = get_full_surface(&dataset, &dataset.tenors(), &calib_params, &config);
    println!("\nTenor | alpha | nu | rho | converged");
    for ((t, p), converged) in build
        .grid
        .tenors
        .iter()
        .zip(&build.grid.params)
        .zip(&build.grid.converged)
    {
        println!(
            "{:>5.1} | {:.5} | {:.4} | {:+.4} | {}",
            t, p.alpha, p.nu, p.rho, converged
        );
    }
    for failure in &build.failures {
        println!(
            "tenor {} failed ({:?}): {}",
            failure.tenor, failure.kind, failure.message
        );
    }

    let smile = get_smile(&dataset, tenor, &calib_params, &config)?;
    println!(
        "\nTenor {}y: forward {:.4}%, ATM vol {:.2}%, {} iterations, residual norm {:.3e}",
        tenor,
        smile.forward * 100.0,
        smile.atm_vol * 100.0,
        smile.calibration.iterations,
        smile.calibration.residual_norm
    );
    println!("Strike% | Market% | Model% | Diff%");
    for ((k, m), f) in smile
        .strikes
        .iter()
        .zip(&smile.market_vols)
        .zip(&smile.fitted_vols)
    {
        println!(
            "{:.2} | {:.2} | {:.2} | {:+.3}",
            k * 100.0,
            m * 100.0,
            f * 100.0,
            (f - m) * 100.0
        );
    }

    // Prepare data for plotting, in percent
    let (curve_strikes, curve_vols) = smile.curve(250)?;
    let model_line: Vec<(f64, f64)> = curve_strikes
        .iter()
        .zip(&curve_vols)
        .map(|(k, v)| (k * 100.0, v * 100.0))
        .collect();
    let market_points: Vec<(f64, f64)> = smile
        .strikes
        .iter()
        .zip(&smile.market_vols)
        .map(|(k, v)| (k * 100.0, v * 100.0))
        .collect();

    let (x_min, x_max) = (model_line[0].0, model_line[model_line.len() - 1].0);
    let all_vols = model_line.iter().chain(&market_points).map(|p| p.1);
    let (min_iv, max_iv) = all_vols.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    let padding = (max_iv - min_iv) * 0.05;
    let y_min = (min_iv - padding).max(0.0);
    let y_max = max_iv + padding;

    let root = SVGBackend::new("sabr_smile.svg", (1280, 768)).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .margin(20)
        .caption(
            format!(
                "SABR vs Market Smile | {}y (beta={}, F={:.3}%)",
                tenor,
                calib_params.beta,
                smile.forward * 100.0
            ),
            ("sans-serif", 30),
        )
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)?;

    chart
        .configure_mesh()
        .x_desc("Strike (%)")
        .y_desc("Implied Vol (%)")
        .draw()?;

    chart
        .draw_series(
            market_points
                .iter()
                .map(|pt| Circle::new(*pt, 4, BLUE.filled())),
        )?
        .label("Market")
        .legend(|(x, y)| Circle::new((x + 10, y), 4, BLUE.filled()));

    chart
        .draw_series(std::iter::once(PathElement::new(model_line, RED)))?
        .label("SABR")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], RED));

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;

    root.present()?;
    println!("Chart saved to sabr_smile.svg");
    Ok(())
}
