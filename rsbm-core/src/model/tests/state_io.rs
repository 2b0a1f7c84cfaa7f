//! Exporting results and importing initial state.

use super::{add_reservoir, carbon_builder, euler, link};
use crate::errors::RSBMError;
use crate::model::{InitialState, Model, ModelExport, ModelWarning, ReservoirInitialState};
use crate::process::Process;
use crate::units::{Quantity, Unit};
use approx::assert_relative_eq;

fn two_box() -> Model {
    let mut builder = carbon_builder(euler(4.0));
    builder
        .create_reservoir(
            "surface",
            "C",
            Quantity::new(100.0, "mol").unwrap(),
            Quantity::new(4.0, "L").unwrap(),
            Some(2.0),
        )
        .unwrap();
    add_reservoir(&mut builder, "deep", 50.0, Some(-1.0));
    link(
        &mut builder,
        "sinking",
        "surface",
        "deep",
        vec![Process::ScaleWithMass {
            scale: 0.1,
            reference: None,
        }
        .into()],
    );
    link(&mut builder, "upwelling", "deep", "surface", vec![Process::constant(5.0).into()]);
    builder.build().unwrap()
}

#[test]
fn export_contains_every_point() {
    let mut model = two_box();
    model.run().unwrap();
    let export = model.export();

    assert_eq!(export.time_unit, "yr");
    let surface = export.reservoir("surface").unwrap();
    assert_eq!(surface.species, "C");
    assert_eq!(surface.mass_unit, "mol");
    assert_eq!(surface.concentration_unit, "mol/L");
    assert_eq!(surface.isotope_scale.as_deref(), Some("VPDB"));
    assert_eq!(surface.rows.len(), 5);
    assert_eq!(surface.rows[0].time, 0.0);
    assert_eq!(surface.rows[0].concentration, Some(25.0));
    assert_eq!(surface.rows[0].delta, Some(2.0));
    assert_eq!(surface.last().unwrap().time, 4.0);
    let history = model.reservoir("surface").unwrap().mass_history().values().to_vec();
    assert_eq!(surface.masses(), history);
}

#[test]
fn export_columns_carry_units() {
    let mut builder = carbon_builder(euler(2.0));
    builder
        .create_reservoir(
            "surface",
            "C",
            Quantity::new(100.0, "mol").unwrap(),
            Quantity::new(4.0, "L").unwrap(),
            None,
        )
        .unwrap()
        .create_reservoir(
            "sediment",
            "C",
            Quantity::new(0.0, "mol").unwrap(),
            Quantity::new(0.0, "L").unwrap(),
            None,
        )
        .unwrap();
    link(&mut builder, "burial", "surface", "sediment", vec![Process::constant(10.0).into()]);
    let mut model = builder.build().unwrap();
    model.run().unwrap();
    let export = model.export();

    let surface = export.reservoir("surface").unwrap();
    let masses = surface.mass_column().unwrap();
    assert_eq!(masses.unit().symbol(), "mol");
    assert_eq!(masses.values().to_vec(), vec![100.0, 90.0, 80.0]);
    let in_mmol = masses.to(&Unit::parse("mmol").unwrap()).unwrap();
    assert_relative_eq!(in_mmol.values()[2], 80_000.0);

    let concentrations = surface.concentration_column().unwrap().unwrap();
    assert_eq!(concentrations.unit().symbol(), "mol/L");
    assert_relative_eq!(concentrations.values()[1], 22.5);

    // No volume, so no concentration
    let sediment = export.reservoir("sediment").unwrap();
    assert!(sediment.concentration_column().unwrap().is_none());
    assert_eq!(sediment.mass_column().unwrap().values().to_vec(), vec![0.0, 10.0, 20.0]);
}

#[test]
fn partial_export_after_a_few_steps() {
    let mut model = two_box();
    model.step().unwrap();
    model.step().unwrap();

    let export = model.export();
    assert_eq!(export.reservoir("deep").unwrap().rows.len(), 3);
    assert_eq!(export.reservoir("deep").unwrap().last().unwrap().time, 2.0);
}

#[test]
fn export_serializes() {
    let mut model = two_box();
    model.run().unwrap();
    let export = model.export();

    let serialised = serde_json::to_string(&export).unwrap();
    // Not recorded, so left out
    assert!(!serialised.contains("fluxes"));
    let deserialised: ModelExport = serde_json::from_str(&serialised).unwrap();
    assert_eq!(deserialised.reservoirs.len(), 2);
    for (read, written) in deserialised.reservoirs.iter().zip(export.reservoirs.iter()) {
        assert_eq!(read.name, written.name);
        assert_eq!(read.rows.len(), written.rows.len());
        for (a, b) in read.masses().iter().zip(written.masses().iter()) {
            assert_relative_eq!(*a, *b, max_relative = 1e-12);
        }
    }
}

#[test]
fn spin_up_from_final_state() {
    let mut spin_up = two_box();
    spin_up.run().unwrap();
    let state = spin_up.export().final_state();
    assert_eq!(state.reservoirs.len(), 2);

    let mut model = two_box();
    model.import_state(&state).unwrap();
    for reservoir in model.reservoirs().iter() {
        let last = spin_up.reservoir(reservoir.name()).unwrap().state();
        assert_eq!(reservoir.state(), last);
        assert_eq!(reservoir.initial_state(), last);
        assert_eq!(reservoir.history_len(), 1);
    }
    assert!(model.diagnostics().is_empty());

    // Resetting returns to the imported state, not the original one
    model.run().unwrap();
    model.reset().unwrap();
    assert_relative_eq!(
        model.reservoir("surface").unwrap().mass(),
        spin_up.reservoir("surface").unwrap().mass()
    );
}

#[test]
fn unmatched_entries_are_skipped() {
    let mut model = two_box();
    let state = InitialState {
        reservoirs: vec![
            ReservoirInitialState {
                name: "deep".to_string(),
                species: "C".to_string(),
                mass: 80.0,
                delta: Some(0.0),
            },
            ReservoirInitialState {
                name: "sediment".to_string(),
                species: "C".to_string(),
                mass: 1.0,
                delta: None,
            },
            ReservoirInitialState {
                name: "surface".to_string(),
                species: "S".to_string(),
                mass: 1.0,
                delta: None,
            },
        ],
    };
    model.import_state(&state).unwrap();

    assert_eq!(model.reservoir("deep").unwrap().mass(), 80.0);
    assert_eq!(model.reservoir("surface").unwrap().mass(), 100.0);
    let warnings = model.diagnostics().warnings();
    assert_eq!(warnings.len(), 2);
    assert!(matches!(
        &warnings[0],
        ModelWarning::UnmatchedState { reservoir, .. } if reservoir == "sediment"
    ));
    assert!(matches!(
        &warnings[1],
        ModelWarning::UnmatchedState { reservoir, .. } if reservoir == "surface"
    ));
}

#[test]
fn invalid_import_changes_nothing() {
    let mut model = two_box();
    let state = InitialState {
        reservoirs: vec![
            ReservoirInitialState {
                name: "deep".to_string(),
                species: "C".to_string(),
                mass: 80.0,
                delta: None,
            },
            ReservoirInitialState {
                name: "surface".to_string(),
                species: "C".to_string(),
                mass: -1.0,
                delta: None,
            },
        ],
    };
    assert!(matches!(
        model.import_state(&state),
        Err(RSBMError::InvalidConfiguration(_))
    ));
    assert_eq!(model.reservoir("deep").unwrap().mass(), 50.0);
}

#[test]
fn import_requires_a_built_model() {
    let mut model = two_box();
    model.step().unwrap();
    let state = InitialState::default();
    assert!(matches!(
        model.import_state(&state),
        Err(RSBMError::InvalidModelState { .. })
    ));
}

#[test]
fn initial_state_from_json() {
    let state: InitialState = serde_json::from_str(
        r#"{"reservoirs": [{"name": "deep", "species": "C", "mass": 75.0, "delta": null}]}"#,
    )
    .unwrap();
    let mut model = two_box();
    model.import_state(&state).unwrap();
    assert_eq!(model.reservoir("deep").unwrap().mass(), 75.0);
    assert_eq!(model.reservoir("deep").unwrap().delta(), None);
}
