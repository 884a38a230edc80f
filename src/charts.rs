use plotters::prelude::*;
use std::fs;
use std::path::Path;

use crate::logger::Logger;
use crate::scenarios::double_integrator_blend::{self as blend, INITIAL_STATE};
use crate::simulation::SimulationRun;

const STATE_COLORS: [RGBColor; 4] = [BLUE, RED, GREEN, MAGENTA];

/// Generate trajectory charts for the double integrator blend and its two components
pub fn generate_blend_charts() -> Result<(), Box<dyn std::error::Error>> {
    fs::create_dir_all("charts")?;

    let dynamics = blend::double_integrator();
    let mut logger = Logger::new();

    let mpc = blend::mpc_controller(dynamics.clone())?;
    let run_mpc = blend::simulate(&*dynamics, &mpc, &mut logger)?;
    plot_simulation(&run_mpc, "MPC alone", Path::new("charts/blend_mpc.png"))?;

    let feedback = blend::feedback_controller(dynamics.clone())?;
    let run_feedback = blend::simulate(&*dynamics, &feedback, &mut logger)?;
    plot_simulation(&run_feedback, "State feedback alone", Path::new("charts/blend_feedback.png"))?;

    let mut aggregator = blend::blended_controller(dynamics.clone())?;
    let run_blend = SimulationRun::run(&*dynamics, &mut aggregator, &INITIAL_STATE, blend::DT, blend::STEPS, &mut logger)?;
    plot_simulation(&run_blend, "Blend 60/40 with noise", Path::new("charts/blend_aggregated.png"))?;

    Ok(())
}

/// Value range of `values` padded by 10%, never degenerate
fn padded_range<'a>(values: impl Iterator<Item = &'a f64>) -> (f64, f64) {
    let (min, max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if !min.is_finite() || !max.is_finite() {
        return (-1.0, 1.0);
    }
    let pad = ((max - min) * 0.1).max(1e-3);
    (min - pad, max + pad)
}

/// Draw state components (top) and actions (bottom) against time into a PNG
pub fn plot_simulation(run: &SimulationRun, title: &str, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    if run.actions.is_empty() {
        return Err("Cannot plot an empty simulation run".into());
    }

    let t_end = run.times[run.times.len() - 1].max(1e-3);
    let root = BitMapBackend::new(path, (1000, 800)).into_drawing_area();
    root.fill(&WHITE)?;
    let root = root.titled(title, ("sans-serif", 30).into_font())?;
    let (upper, lower) = root.split_vertically(400);

    // States, without the final one so that times line up
    let (x_min, x_max) = padded_range(run.states.iter().take(run.times.len()).flatten());
    let mut state_chart = ChartBuilder::on(&upper)
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(0.0..t_end, x_min..x_max)?;
    state_chart.configure_mesh().x_desc("Time").y_desc("State").draw()?;

    let nx = run.states[0].len();
    for i in 0..nx {
        let color = STATE_COLORS[i % STATE_COLORS.len()];
        state_chart
            .draw_series(LineSeries::new(
                run.times.iter().zip(&run.states).map(|(&t, x)| (t, x[i])),
                &color,
            ))?
            .label(format!("x[{}]", i))
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
    }
    state_chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;

    let (u_min, u_max) = padded_range(run.actions.iter().flatten());
    let mut action_chart = ChartBuilder::on(&lower)
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(0.0..t_end, u_min..u_max)?;
    action_chart.configure_mesh().x_desc("Time").y_desc("Action").draw()?;

    let nu = run.actions[0].len();
    for j in 0..nu {
        let color = STATE_COLORS[(j + 2) % STATE_COLORS.len()];
        action_chart
            .draw_series(LineSeries::new(
                run.times.iter().zip(&run.actions).map(|(&t, u)| (t, u[j])),
                &color,
            ))?
            .label(format!("u[{}]", j))
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
    }
    action_chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;

    root.present()?;
    println!("Chart saved to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_padded_range() {
        let values = [1.0, 3.0];
        let (lo, hi) = padded_range(values.iter());
        assert!((lo - 0.8).abs() < 1e-12);
        assert!((hi - 3.2).abs() < 1e-12);

        let empty: [f64; 0] = [];
        assert_eq!(padded_range(empty.iter()), (-1.0, 1.0));

        let flat = [2.0, 2.0];
        let (lo, hi) = padded_range(flat.iter());
        assert!(lo < 2.0 && hi > 2.0);
    }
}
