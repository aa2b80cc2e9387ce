#![allow(non_snake_case)]
//! Jeffery-Hamel study driver: solves the momentum and coupled
//! momentum-energy systems for every configured Reynolds number, derives
//! the pressure and stress fields, and writes CSV tables and PNG figures.
use JefferyHamelRs::Utils::logger::save_profiles_csv;
use JefferyHamelRs::Utils::plots::plot_series;
use JefferyHamelRs::numerical::BVP_colloc::BVP_colloc_main::{BvpSolution, SolverError};
use JefferyHamelRs::physics::jeffery_hamel::{
    initial_mesh, solve_case, FlowConfig, FlowVariant,
};
use JefferyHamelRs::physics::post_processing::{
    normal_stresses, pressure_distribution, shear_stress,
};
use log::{error, info, warn};
use nalgebra::DVector;
use rayon::prelude::*;
use simplelog::{ColorChoice, CombinedLogger, Config, LevelFilter, TermLogger, TerminalMode};
use tabled::{builder::Builder, settings::Style};

/// Number of points of the uniform post-processing grid on [0, 1]
const PLOT_POINTS: usize = 100;

struct CaseReport {
    variant: FlowVariant,
    re: f64,
    outcome: Result<BvpSolution, SolverError>,
}

/// One physical field: a named figure plus the matching CSV table.
fn export_field(
    stem: &str,
    title: &str,
    y_label: &str,
    eta: &DVector<f64>,
    series: &[(String, DVector<f64>)],
) {
    if series.is_empty() {
        warn!("no converged cases for {}; skipping output", stem);
        return;
    }
    let png = format!("{}.png", stem);
    if let Err(e) = plot_series(&png, title, "eta", y_label, eta, series) {
        error!("could not draw {}: {}", png, e);
    }
    let csv = format!("{}.csv", stem);
    if let Err(e) = save_profiles_csv(&csv, "eta", eta, series) {
        error!("could not write {}: {}", csv, e);
    }
}

fn main() {
    let _ = CombinedLogger::init(vec![TermLogger::new(
        LevelFilter::Info,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )]);

    let config = match FlowConfig::study() {
        Ok(config) => config,
        Err(e) => {
            error!("invalid study configuration: {}", e);
            return;
        }
    };
    info!(
        "Jeffery-Hamel study: alpha = {:.1} deg, Pr = {:.3}, Re = {:?}",
        config.alpha.to_degrees(),
        config.prandtl,
        config.re_values
    );

    let variants = [
        FlowVariant::MomentumOnly,
        FlowVariant::CoupledNoDissipation,
        FlowVariant::CoupledWithDissipation,
    ];
    let cases: Vec<(FlowVariant, f64)> = variants
        .iter()
        .flat_map(|v| config.re_values.iter().map(move |re| (*v, *re)))
        .collect();

    // every case owns its mesh and state, so the sweep parallelizes
    // without any coordination
    let reports: Vec<CaseReport> = cases
        .par_iter()
        .map(|&(variant, re)| CaseReport {
            variant,
            re,
            outcome: solve_case(&config, variant, re),
        })
        .collect();

    for report in &reports {
        if let Err(e) = &report.outcome {
            warn!(
                "solution was not successful for Re = {} ({} system): {}",
                report.re,
                report.variant.label(),
                e
            );
        }
    }

    let eta_plot = initial_mesh(PLOT_POINTS);
    let pts: Vec<f64> = eta_plot.iter().cloned().collect();

    // momentum-only fields: velocity, pressure, shear and normal stresses
    let mut velocity = Vec::new();
    let mut pressure = Vec::new();
    let mut shear = Vec::new();
    let mut radial = Vec::new();
    let mut circumferential = Vec::new();
    for report in &reports {
        if report.variant != FlowVariant::MomentumOnly {
            continue;
        }
        let Ok(sol) = &report.outcome else { continue };
        let label = format!("Re={}", report.re);
        let y = sol.eval(&pts);
        let f: DVector<f64> = y.row(0).transpose();
        let df: DVector<f64> = y.row(1).transpose();

        let p = pressure_distribution(&config, report.re, &pts);
        let tau_theta_r = shear_stress(&config, report.re, &df);
        let (tau_rr, tau_theta_theta) = normal_stresses(&config, report.re, &f);

        velocity.push((label.clone(), f));
        pressure.push((label.clone(), p));
        shear.push((label.clone(), tau_theta_r));
        radial.push((label.clone(), tau_rr));
        circumferential.push((label, tau_theta_theta));
    }
    export_field("velocity_profile", "Velocity Profile", "f", &eta_plot, &velocity);
    export_field(
        "pressure_distribution",
        "Pressure Distribution",
        "p",
        &eta_plot,
        &pressure,
    );
    export_field("shear_stress", "Shear Stress", "tau_theta_r", &eta_plot, &shear);
    export_field(
        "radial_normal_stress",
        "Radial Normal Stress",
        "tau_rr",
        &eta_plot,
        &radial,
    );
    export_field(
        "circumferential_normal_stress",
        "Circumferential Normal Stress",
        "tau_theta_theta",
        &eta_plot,
        &circumferential,
    );

    // temperature function G for the coupled variants
    for (variant, stem, title) in [
        (
            FlowVariant::CoupledNoDissipation,
            "temperature_without_dissipation",
            "Temperature Function G (Without Dissipation)",
        ),
        (
            FlowVariant::CoupledWithDissipation,
            "temperature_with_dissipation",
            "Temperature Function G (With Dissipation)",
        ),
    ] {
        let mut temperature = Vec::new();
        for report in &reports {
            if report.variant != variant {
                continue;
            }
            let Ok(sol) = &report.outcome else { continue };
            let y = sol.eval(&pts);
            temperature.push((format!("Re={}", report.re), y.row(3).transpose()));
        }
        export_field(stem, title, "G", &eta_plot, &temperature);
    }

    // per-case summary
    let mut builder = Builder::default();
    builder.push_record(["system", "Re", "status", "nodes", "passes"]);
    for report in &reports {
        match &report.outcome {
            Ok(sol) => builder.push_record([
                report.variant.label().to_string(),
                report.re.to_string(),
                "converged".to_string(),
                sol.x.len().to_string(),
                sol.niter.to_string(),
            ]),
            Err(e) => builder.push_record([
                report.variant.label().to_string(),
                report.re.to_string(),
                e.to_string(),
                "-".to_string(),
                "-".to_string(),
            ]),
        }
    }
    let mut table = builder.build();
    table.with(Style::modern());
    info!("\n{}", table);
}
