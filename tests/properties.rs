use error_model::binning::IntensityBinner;
use error_model::data::{SampleSpec, generate_table};
use error_model::domain::{ErrorModelConfig, ModelParameters, ObservationTable, RefineOptions};
use error_model::error::ErrorModelError;
use error_model::filter::{FilterOptions, filter_reflections};
use error_model::fit::{IndividualAManager, ParameterManager, RegressionManager, refine_individual};
use error_model::model::BasicErrorModel;
use error_model::models::normalised_deviations;
use statrs::statistics::Statistics;

fn filtered_sample(spec: &SampleSpec) -> ObservationTable {
    let table = generate_table(spec).unwrap();
    filter_reflections(&table, &FilterOptions::default()).unwrap()
}

#[test]
fn bins_cover_every_filtered_row_once() {
    let spec = SampleSpec {
        n_groups: 400,
        scale_range: (0.5, 2.0),
        ..SampleSpec::default()
    };
    let table = filtered_sample(&spec);
    let n = table.len();
    let binner = IntensityBinner::new(table, 250, 10);

    let summary = binner.summary();
    assert_eq!(summary.occupancy.iter().sum::<usize>(), n);
    assert_eq!(summary.n_reflections, n);
    assert_eq!(binner.incidence().n_rows(), n);
    assert!(binner.incidence().row_columns().iter().all(|&k| k < summary.n_bins()));
}

#[test]
fn bin_boundaries_strictly_decrease() {
    for seed in [1, 2, 3] {
        let spec = SampleSpec {
            n_groups: 300,
            seed,
            ..SampleSpec::default()
        };
        let binner = IntensityBinner::new(filtered_sample(&spec), 250, 10);
        let boundaries = &binner.summary().boundaries;
        assert_eq!(boundaries.len(), binner.summary().n_bins() + 1);
        assert!(boundaries.windows(2).all(|w| w[0] > w[1]), "{boundaries:?}");
    }
}

#[test]
fn managers_never_resolve_to_non_positive_a() {
    let table = generate_table(&SampleSpec::default()).unwrap();
    let mut model = BasicErrorModel::new(&ErrorModelConfig::default()).unwrap();
    model.configure(&table, 0.4).unwrap();

    {
        let mut m = RegressionManager::new(&mut model);
        m.set(&[-0.5, 0.01]).unwrap();
        assert_eq!(
            m.resolve().unwrap_err(),
            ErrorModelError::NegativeParameter { parameter: "a^2" }
        );
    }
    {
        let mut m = IndividualAManager::new(&mut model);
        m.set(&[0.0, 0.0]).unwrap();
        assert!(matches!(m.resolve(), Err(ErrorModelError::NegativeParameter { .. })));
    }
    // Failed resolves leave the committed parameters alone.
    assert_eq!(model.parameters(), ModelParameters::default());

    let mut m = RegressionManager::new(&mut model);
    m.set(&[1.44, 1.44 * 0.0009]).unwrap();
    let p = m.resolve().unwrap();
    assert!(p.a > 0.0 && p.b >= 0.0);
}

#[test]
fn identity_model_leaves_variances_unchanged() {
    let model = BasicErrorModel::with_parameters(ModelParameters::identity()).unwrap();
    let v = vec![0.5, 12.0, 1.0e6, 3.25];
    let i = vec![-40.0, 0.0, 1.0e4, 7.5];
    assert_eq!(model.update_variances(&v, &i).unwrap(), v);
}

#[test]
fn individual_refinement_calibrates_random_data() {
    let truth = ModelParameters::new(1.2, 0.03);
    let target = truth.asymptotic_isigma().unwrap();
    let mut hits = 0;
    for seed in 0..6 {
        let table = generate_table(&SampleSpec {
            truth,
            seed,
            ..SampleSpec::default()
        })
        .unwrap();
        let mut model = BasicErrorModel::new(&ErrorModelConfig::default()).unwrap();
        model.configure(&table, 0.4).unwrap();
        let start = model.bin_variances().unwrap().unit_variance_residual();

        if refine_individual(&mut model, &RefineOptions::default()).is_err() {
            continue;
        }
        let fitted = model.bin_variances().unwrap().unit_variance_residual();
        let isigma = model.parameters().asymptotic_isigma().unwrap();
        if fitted < 0.1 * start && (isigma - target).abs() / target < 0.3 {
            hits += 1;
        }
    }
    assert!(hits >= 5, "calibrated {hits} of 6 seeds");
}

#[test]
fn small_random_scenario_improves_bin_calibration() {
    let config = ErrorModelConfig {
        min_reflections_required: 100,
        ..ErrorModelConfig::default()
    };
    let options = RefineOptions {
        max_cycles: 10,
        ..RefineOptions::default()
    };
    let mut hits = 0;
    for seed in 0..6 {
        let table = generate_table(&SampleSpec {
            n_groups: 50,
            multiplicity: 5,
            seed,
            ..SampleSpec::default()
        })
        .unwrap();
        let mut model = BasicErrorModel::new(&config).unwrap();
        model.configure(&table, 0.4).unwrap();
        let start = model.bin_variances().unwrap().unit_variance_residual();
        if refine_individual(&mut model, &options).is_ok()
            && model.bin_variances().unwrap().unit_variance_residual() < 0.5 * start
        {
            hits += 1;
        }
    }
    assert!(hits >= 5, "improved {hits} of 6 seeds");
}

#[test]
fn singleton_groups_are_filtered_out() {
    let base = generate_table(&SampleSpec {
        n_groups: 180,
        ..SampleSpec::default()
    })
    .unwrap();
    assert_eq!(base.len(), 900);

    let mut intensity = base.intensity.clone();
    let mut variance = base.variance.clone();
    let mut inverse_scale = base.inverse_scale.clone();
    let mut ih = base.ih.clone();
    let mut group = base.group.clone();
    for k in 0..100 {
        let mu = 100.0 + 10.0 * k as f64;
        intensity.push(mu);
        variance.push(mu);
        inverse_scale.push(1.0);
        ih.push(mu);
        group.push(180 + k);
    }
    let table = ObservationTable::new(intensity, variance, inverse_scale, ih, group).unwrap();
    assert_eq!(table.len(), 1000);

    let filtered = filter_reflections(&table, &FilterOptions::default()).unwrap();
    assert!(filtered.len() <= 900);
    assert!(filtered.group.iter().all(|&g| g < 180));
}

#[test]
fn small_tables_are_insufficient() {
    let table = generate_table(&SampleSpec {
        n_groups: 10,
        ..SampleSpec::default()
    })
    .unwrap();
    assert_eq!(table.len(), 50);

    let config = ErrorModelConfig {
        min_reflections_required: 250,
        ..ErrorModelConfig::default()
    };
    let mut model = BasicErrorModel::new(&config).unwrap();
    match model.configure(&table, 0.4) {
        Err(ErrorModelError::InsufficientData { actual, required }) => {
            assert!(actual <= 50);
            assert_eq!(required, 250);
        }
        other => panic!("expected InsufficientData, got {other:?}"),
    }
    assert!(model.binning().is_none());
}

#[test]
fn deviations_at_truth_are_standard_normal() {
    let spec = SampleSpec {
        n_groups: 400,
        multiplicity: 5,
        ..SampleSpec::default()
    };
    let table = generate_table(&spec).unwrap();
    assert!(table.len() >= 1000);

    let multiplicity: Vec<f64> = table.group_incidence().row_counts().iter().map(|&n| n as f64).collect();
    let deltas = normalised_deviations(spec.truth, &table, &multiplicity);

    let mean = deltas.iter().mean();
    let var = deltas.iter().variance();
    assert!(mean.abs() < 0.1, "mean = {mean}");
    assert!((var - 1.0).abs() < 0.15, "variance = {var}");
}
