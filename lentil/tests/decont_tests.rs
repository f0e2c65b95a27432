use approx::assert_abs_diff_eq;
use lentil::batch::*;
use lentil::counts::CountMatrix;
use lentil::em::*;
use lentil::error::is_invalid_parameter;
use lentil::params::DecontArgs;
use lentil::simulate::*;

fn small_simulation() -> anyhow::Result<SimOut> {
    generate_contaminated_counts(&SimArgs {
        cells: 80,
        genes: 40,
        ..Default::default()
    })
}

fn pearson(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len() as f64;
    let mx = x.iter().sum::<f64>() / n;
    let my = y.iter().sum::<f64>() / n;
    let sxy: f64 = x.iter().zip(y).map(|(a, b)| (a - mx) * (b - my)).sum();
    let sxx: f64 = x.iter().map(|a| (a - mx).powi(2)).sum();
    let syy: f64 = y.iter().map(|b| (b - my).powi(2)).sum();
    sxy / (sxx * syy).sqrt()
}

#[test]
fn recovers_simulated_contamination() -> anyhow::Result<()> {
    let sim = generate_contaminated_counts(&SimArgs::default())?;
    let data = sim.observed_counts()?;
    let z = sim.cluster_labels();

    let result = run_decont(&data, Some(z.as_slice()), None, &DecontArgs::default())?;

    let truth = sim.true_contamination_fraction();
    let r = pearson(&result.contamination, &truth);
    assert!(r > 0.9, "correlation {}", r);
    Ok(())
}

#[test]
fn decontaminated_counts_are_consistent() -> anyhow::Result<()> {
    let sim = small_simulation()?;
    let data = sim.observed_counts()?;
    let z = sim.cluster_labels();

    let result = run_decont(&data, Some(z.as_slice()), None, &DecontArgs::default())?;

    let yy = data.to_dense();
    let xx = result.decontaminated.to_dense();
    assert_eq!(result.decontaminated.col_names(), data.col_names());
    assert_eq!(result.decontaminated.row_names(), data.row_names());

    for (x, y) in xx.iter().zip(yy.iter()) {
        assert!(*x >= 0. && x <= y);
    }

    for (j, &c) in result.contamination.iter().enumerate() {
        assert!((0. ..=1.).contains(&c));
        assert_abs_diff_eq!(
            xx.column(j).sum(),
            (1. - c) * yy.column(j).sum(),
            epsilon = 1e-6
        );
    }

    let bf = &result.batches["all_cells"];
    for k in 0..bf.fit.phi.ncols() {
        assert_abs_diff_eq!(bf.fit.phi.column(k).sum(), 1., epsilon = 1e-6);
        assert_abs_diff_eq!(bf.fit.eta.column(k).sum(), 1., epsilon = 1e-6);
    }
    assert!(bf.fit.theta.iter().all(|&t| t > 0. && t < 1.));
    assert!(bf.embedding.is_none());
    assert_eq!(bf.fit.trace.iterations()[0], 0);
    Ok(())
}

#[test]
fn same_seed_same_result() -> anyhow::Result<()> {
    let sim = small_simulation()?;
    let data = sim.observed_counts()?;
    let z = sim.cluster_labels();
    let args = DecontArgs::default();

    let a = run_decont(&data, Some(z.as_slice()), None, &args)?;
    let b = run_decont(&data, Some(z.as_slice()), None, &args)?;

    assert_eq!(a.contamination, b.contamination);
    let (fa, fb) = (&a.batches["all_cells"].fit, &b.batches["all_cells"].fit);
    assert_eq!(fa.theta, fb.theta);
    assert_eq!(fa.phi, fb.phi);
    assert_eq!(fa.eta, fb.eta);
    Ok(())
}

#[test]
fn batches_are_fitted_independently() -> anyhow::Result<()> {
    let sim = small_simulation()?;
    let one = sim.observed_counts()?;
    let nn = one.num_cells();
    let z = sim.cluster_labels();

    // two copies of the same cells, one per batch
    let mut yy = one.to_dense().resize_horizontally(2 * nn, 0.);
    for j in 0..nn {
        let y_j = yy.column(j).clone_owned();
        yy.set_column(nn + j, &y_j);
    }
    let cols: Vec<Box<str>> = (0..2 * nn)
        .map(|j| format!("cell_{}", j + 1).into_boxed_str())
        .collect();
    let both = CountMatrix::from_dense(&yy, None, Some(cols))?;

    let z_both: Vec<Box<str>> = z.iter().chain(z.iter()).cloned().collect();
    let batch: Vec<Box<str>> = (0..2 * nn)
        .map(|j| Box::from(if j < nn { "b1" } else { "b2" }))
        .collect();

    let args = DecontArgs::default();
    let joint = run_decont(&both, Some(z_both.as_slice()), Some(batch.as_slice()), &args)?;

    let b1: Vec<Box<str>> = vec![Box::from("b1"); nn];
    let alone = run_decont(&one, Some(z.as_slice()), Some(b1.as_slice()), &args)?;

    assert_eq!(&joint.contamination[..nn], alone.contamination.as_slice());
    assert_eq!(
        joint.batches["b1"].fit.theta,
        alone.batches["b1"].fit.theta
    );

    for j in 0..nn {
        assert_eq!(
            joint.clusters[j].as_ref(),
            format!("b1-{}", alone.clusters[j])
        );
        assert!(joint.clusters[nn + j].starts_with("b2-"));
    }
    assert_eq!(joint.echo.batches.len(), 2);
    Ok(())
}

#[test]
fn one_cluster_is_an_invalid_parameter() -> anyhow::Result<()> {
    let sim = small_simulation()?;
    let data = sim.observed_counts()?;
    let z: Vec<Box<str>> = vec![Box::from("a"); data.num_cells()];

    let err = run_decont(&data, Some(z.as_slice()), None, &DecontArgs::default()).unwrap_err();
    assert!(is_invalid_parameter(&err));
    Ok(())
}

#[test]
fn failing_batch_aborts_the_run() -> anyhow::Result<()> {
    let sim = small_simulation()?;
    let data = sim.observed_counts()?;
    let nn = data.num_cells();

    let batch: Vec<Box<str>> = (0..nn)
        .map(|j| Box::from(if j < nn / 2 { "b1" } else { "b2" }))
        .collect();
    // b1 has two clusters, b2 only one
    let z: Vec<Box<str>> = (0..nn)
        .map(|j| Box::from(if j < nn / 2 && j % 2 == 0 { "x" } else { "y" }))
        .collect();

    let err = run_decont(
        &data,
        Some(z.as_slice()),
        Some(batch.as_slice()),
        &DecontArgs::default(),
    )
    .unwrap_err();

    assert!(is_invalid_parameter(&err));
    let msg = format!("{:#}", err);
    assert!(msg.contains("batch b2"), "{}", msg);
    Ok(())
}

#[test]
fn one_more_step_at_the_fixed_point() -> anyhow::Result<()> {
    let sim = small_simulation()?;
    let data = sim.observed_counts()?;
    let z: Vec<usize> = sim.z.iter().map(|k| k - 1).collect();
    let args = DecontArgs::default();

    let fit = fit_decont_em(data.counts(), &z, &args, 7)?;
    assert!(fit.converged);

    let mut em = DecontEm::from_state(
        data.counts(),
        &z,
        &args,
        fit.theta.clone(),
        fit.phi.clone(),
        fit.eta.clone(),
        fit.delta,
    )?;
    let change = em.step()?;
    assert!(change < args.convergence, "theta moved by {}", change);
    Ok(())
}

#[test]
fn clusters_are_found_without_labels() -> anyhow::Result<()> {
    let sim = small_simulation()?;
    let data = sim.observed_counts()?;

    let args = DecontArgs {
        seed: None,
        ..Default::default()
    };
    let result = run_decont(&data, None, None, &args)?;

    let bf = &result.batches["all_cells"];
    assert!(bf.cluster_names.len() >= 2);
    assert_eq!(bf.embedding.as_ref().map(|e| e.shape()), Some((80, 2)));
    assert!(!result.echo.reproducible);
    assert!(!result.echo.labels_supplied);
    assert!(result.contamination.iter().all(|c| (0. ..=1.).contains(c)));
    Ok(())
}
