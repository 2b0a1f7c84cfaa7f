//! Same-step dependencies between connections and updates to a built model.

use super::{add_reservoir, carbon_builder, euler, link};
use crate::errors::{RSBMError, RSBMResult};
use crate::model::{ModelBuilder, ModelStatus};
use crate::process::{Dependency, FluxRate, Process, ProcessContext, ProcessParameters};
use crate::timeseries::Time;
use approx::assert_relative_eq;
use std::sync::Arc;

fn uptake(
    ctx: &ProcessContext<'_>,
    parameters: &ProcessParameters,
    _t: Time,
) -> RSBMResult<FluxRate> {
    let reservoir = ctx.updated_reservoir(parameters.reference.as_deref().unwrap_or("B"))?;
    Ok(FluxRate::new(parameters.scale * reservoir.mass))
}

fn follow_supply(
    ctx: &ProcessContext<'_>,
    parameters: &ProcessParameters,
    _t: Time,
) -> RSBMResult<FluxRate> {
    Ok(FluxRate::new(parameters.scale * ctx.flux("supply")?.rate))
}

/// `A -> B -> C`, with `supply` at a constant rate and `uptake` bound later.
fn chain() -> ModelBuilder {
    let mut builder = carbon_builder(euler(3.0));
    add_reservoir(&mut builder, "A", 100.0, None);
    add_reservoir(&mut builder, "B", 0.0, None);
    add_reservoir(&mut builder, "C", 0.0, None);
    builder
        .register_process("uptake", Arc::new(uptake))
        .unwrap()
        .register_process("follow_supply", Arc::new(follow_supply))
        .unwrap();
    builder
}

#[test]
fn flux_reads_are_evaluated_first() {
    let mut builder = chain();
    // Inserted before the connection it reads
    link(
        &mut builder,
        "transfer",
        "B",
        "C",
        vec![Process::ScaleWithFlux {
            scale: 0.5,
            flux: "supply".to_string(),
        }
        .into()],
    );
    link(&mut builder, "supply", "A", "B", vec![Process::constant(10.0).into()]);
    let mut model = builder.build().unwrap();

    assert_eq!(model.plan().ordered_names(), vec!["supply", "transfer"]);
    model.run().unwrap();
    assert_relative_eq!(model.reservoir("C").unwrap().mass(), 15.0);
    assert_relative_eq!(model.reservoir("B").unwrap().mass(), 15.0);
}

#[test]
fn updated_reservoir_sees_same_step_inputs() {
    let mut builder = chain();
    link(
        &mut builder,
        "uptake",
        "B",
        "C",
        vec![Process::custom("uptake", ProcessParameters::new().with_scale(0.1))
            .depending_on(Dependency::UpdatedReservoir("B".to_string()))
            .into()],
    );
    link(&mut builder, "supply", "A", "B", vec![Process::constant(10.0).into()]);
    let mut model = builder.build().unwrap();
    assert_eq!(model.plan().ordered_names(), vec!["supply", "uptake"]);

    model.step().unwrap();
    // B is empty at the start of the step but has received 10 by the time
    // the uptake reads it
    assert_relative_eq!(model.reservoir("C").unwrap().mass(), 1.0);
    assert_relative_eq!(model.reservoir("B").unwrap().mass(), 9.0);

    model.step().unwrap();
    // 0.1 * (9 + 10)
    assert_relative_eq!(model.reservoir("C").unwrap().mass(), 2.9);
}

#[test]
fn cyclic_flux_reads_are_rejected() {
    let mut builder = chain();
    link(
        &mut builder,
        "x",
        "A",
        "B",
        vec![Process::ScaleWithFlux {
            scale: 0.5,
            flux: "y".to_string(),
        }
        .into()],
    );
    link(
        &mut builder,
        "y",
        "B",
        "C",
        vec![Process::ScaleWithFlux {
            scale: 0.5,
            flux: "x".to_string(),
        }
        .into()],
    );

    let err = builder.build().unwrap_err();
    assert_eq!(
        err,
        RSBMError::CyclicDependency {
            connections: vec!["x".to_string(), "y".to_string()]
        }
    );
}

#[test]
fn reading_own_flux_is_cyclic() {
    let mut builder = chain();
    link(
        &mut builder,
        "x",
        "A",
        "B",
        vec![Process::ScaleWithFlux {
            scale: 0.5,
            flux: "x".to_string(),
        }
        .into()],
    );
    assert!(matches!(
        builder.build(),
        Err(RSBMError::CyclicDependency { .. })
    ));
}

#[test]
fn mutual_updated_reads_are_cyclic() {
    let mut builder = chain();
    let reads_b = Process::custom("uptake", ProcessParameters::new().with_reference("B"))
        .depending_on(Dependency::UpdatedReservoir("B".to_string()));
    // Both connections touch B and both want to see it after the other
    link(&mut builder, "in", "A", "B", vec![reads_b.clone().into()]);
    link(&mut builder, "out", "B", "C", vec![reads_b.into()]);
    assert!(matches!(
        builder.build(),
        Err(RSBMError::CyclicDependency { .. })
    ));
}

#[test]
fn undeclared_read_fails_the_run() {
    let mut builder = chain();
    link(&mut builder, "supply", "A", "B", vec![Process::constant(10.0).into()]);
    link(
        &mut builder,
        "follow",
        "B",
        "C",
        vec![Process::custom("follow_supply", ProcessParameters::new()).into()],
    );
    let mut model = builder.build().unwrap();

    let err = model.run().unwrap_err();
    match err {
        RSBMError::Integration {
            step,
            location,
            details,
            ..
        } => {
            assert_eq!(step, 0);
            assert_eq!(location, "connection 'follow'");
            assert!(details.contains("without declaring"), "{details}");
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(model.status(), ModelStatus::Failed);
    assert_eq!(model.reservoir("B").unwrap().history_len(), 1);
}

#[test]
fn update_parameters_without_recompiling() {
    let mut builder = chain();
    link(&mut builder, "supply", "A", "B", vec![Process::constant(10.0).into()]);
    let mut model = builder.build().unwrap();

    model
        .update_connection("supply", vec![Process::constant(2.0).into()])
        .unwrap();
    model.run().unwrap();
    assert_relative_eq!(model.reservoir("B").unwrap().mass(), 6.0);
}

#[test]
fn update_with_new_dependency_reorders() {
    let mut builder = chain();
    link(&mut builder, "transfer", "B", "C", vec![Process::constant(1.0).into()]);
    link(&mut builder, "supply", "A", "B", vec![Process::constant(10.0).into()]);
    let mut model = builder.build().unwrap();
    assert_eq!(model.plan().ordered_names(), vec!["transfer", "supply"]);

    model
        .update_connection(
            "transfer",
            vec![Process::custom("follow_supply", ProcessParameters::new().with_scale(0.2))
                .depending_on(Dependency::Flux("supply".to_string()))
                .into()],
        )
        .unwrap();
    assert_eq!(model.plan().ordered_names(), vec!["supply", "transfer"]);

    model.step().unwrap();
    assert_relative_eq!(model.reservoir("C").unwrap().mass(), 2.0);
}

#[test]
fn cyclic_update_leaves_model_unchanged() {
    let mut builder = chain();
    link(&mut builder, "supply", "A", "B", vec![Process::constant(10.0).into()]);
    link(
        &mut builder,
        "transfer",
        "B",
        "C",
        vec![Process::ScaleWithFlux {
            scale: 0.5,
            flux: "supply".to_string(),
        }
        .into()],
    );
    let mut model = builder.build().unwrap();
    let order = model.plan().ordered_names().join(",");

    let err = model
        .update_connection(
            "supply",
            vec![Process::ScaleWithFlux {
                scale: 1.0,
                flux: "transfer".to_string(),
            }
            .into()],
        )
        .unwrap_err();
    assert!(matches!(err, RSBMError::InvalidConnectionUpdate { .. }));
    assert_eq!(model.plan().ordered_names().join(","), order);
    assert_eq!(
        model.connection("supply").unwrap().bindings()[0].process,
        Process::constant(10.0)
    );

    // The model still runs with the original bindings
    model.run().unwrap();
    assert_relative_eq!(model.reservoir("C").unwrap().mass(), 15.0);
}

#[test]
fn update_requires_a_built_model() {
    let mut builder = chain();
    link(&mut builder, "supply", "A", "B", vec![Process::constant(10.0).into()]);
    let mut model = builder.build().unwrap();
    model.step().unwrap();

    assert!(matches!(
        model.update_connection("supply", vec![Process::constant(1.0).into()]),
        Err(RSBMError::InvalidModelState { .. })
    ));
    model.reset().unwrap();
    assert!(matches!(
        model.update_connection("missing", vec![Process::constant(1.0).into()]),
        Err(RSBMError::UnknownName { .. })
    ));
    let missing = Process::custom("missing", ProcessParameters::new());
    assert!(matches!(
        model.update_connection("supply", vec![missing.into()]),
        Err(RSBMError::InvalidConnectionUpdate { .. })
    ));
}
