use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use itertools::Itertools;
use num_complex::Complex64;
use rand::{thread_rng, Rng};
use rlwe::{
    Ciphertext, Encoder, EvaluationKey, Evaluator, LinearTransform, LinearTransformEncoder,
    Parameters, ParametersLiteral, PolyType, Representation, RotationKeySet,
};
use std::collections::HashMap;

/// Key set with all-zero keys. Timings do not depend on key values.
fn rotation_keys(params: &Parameters, galois_elements: &[usize]) -> RotationKeySet {
    let mut rtks = RotationKeySet::new();
    for g in galois_elements {
        rtks.insert(
            *g,
            EvaluationKey::new(params, params.max_level_q(), params.max_level_p()).unwrap(),
        );
    }
    rtks
}

fn ciphertext(params: &Parameters, log_slots: usize) -> Ciphertext {
    let mut rng = thread_rng();
    let encoder = Encoder::new(params);
    let values = (0..1 << log_slots)
        .map(|_| rng.gen_range(-1.0..1.0))
        .collect_vec();
    let pt = encoder
        .encode(&values, log_slots, params.default_scale, params.max_level_q())
        .unwrap();
    let ctx = params.poly_ctx(&PolyType::Q, params.max_level_q());
    Ciphertext::new(
        vec![
            pt.value().q.clone().unwrap(),
            ctx.random(Representation::Evaluation, &mut rng),
        ],
        params.max_level_q(),
        log_slots,
        params.default_scale,
    )
}

fn bench_evaluator(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluator");
    group.sample_size(10);

    for log_n in [12, 13] {
        let params = Parameters::new(&ParametersLiteral {
            log_n,
            log_q: vec![55, 45, 45, 45],
            log_p: vec![56, 56],
            ..Default::default()
        })
        .unwrap();
        let log_slots = params.log_max_slots();
        let slots = 1usize << log_slots;
        let logq = params.poly_ctx(&PolyType::Q, params.max_level_q()).big_q().bits();

        let batch = 4;
        let mut galois_elements = params.galois_elements_for_inner_sum(batch, slots / batch);
        galois_elements.extend(params.galois_elements_for_trace(log_slots - 2));
        galois_elements.extend(
            (-8..=8).map(|k| params.galois_element_for_column_rotation_by(k)),
        );
        galois_elements.push(params.galois_element_for_row_rotation());
        let galois_elements = galois_elements
            .into_iter()
            .filter(|g| *g != 1)
            .unique()
            .collect_vec();

        let evaluator = Evaluator::new(params.clone(), rotation_keys(&params, &galois_elements));
        let ct = ciphertext(&params, log_slots);

        group.bench_function(
            BenchmarkId::new("rotate", format!("n={}/logq={logq}", params.degree)),
            |b| {
                b.iter(|| evaluator.rotate(&ct, 1).unwrap());
            },
        );

        group.bench_function(
            BenchmarkId::new("conjugate", format!("n={}/logq={logq}", params.degree)),
            |b| {
                b.iter(|| evaluator.conjugate(&ct).unwrap());
            },
        );

        group.bench_function(
            BenchmarkId::new("trace", format!("n={}/logq={logq}", params.degree)),
            |b| {
                b.iter(|| evaluator.trace_new(&ct, log_slots - 2).unwrap());
            },
        );

        let mut ct_out = ct.clone();
        group.bench_function(
            BenchmarkId::new("inner_sum", format!("n={}/logq={logq}", params.degree)),
            |b| {
                b.iter(|| {
                    evaluator
                        .inner_sum(&ct, batch, slots / batch, &mut ct_out)
                        .unwrap()
                });
            },
        );

        let ct_sparse = ciphertext(&params, log_slots - 2);
        let mut ct_out = ct_sparse.clone();
        group.bench_function(
            BenchmarkId::new("average", format!("n={}/logq={logq}", params.degree)),
            |b| {
                b.iter(|| evaluator.average(&ct_sparse, 2, &mut ct_out).unwrap());
            },
        );

        // banded matrix with 17 diagonals
        let mut rng = thread_rng();
        let diagonals: HashMap<isize, Vec<Complex64>> = (-8..=8)
            .map(|k| {
                (
                    k,
                    (0..slots)
                        .map(|_| Complex64::new(rng.gen_range(-1.0..1.0), 0.0))
                        .collect_vec(),
                )
            })
            .collect();
        let encoder = Encoder::new(&params);

        let lt_encoder = LinearTransformEncoder::new(&encoder, diagonals.clone());
        group.bench_function(
            BenchmarkId::new("encode_naive", format!("n={}/logq={logq}", params.degree)),
            |b| {
                b.iter(|| {
                    LinearTransform::new_naive(
                        &params,
                        &lt_encoder,
                        params.max_level_q(),
                        params.default_scale,
                        log_slots,
                    )
                    .unwrap()
                });
            },
        );
        let lt_naive = LinearTransform::new_naive(
            &params,
            &lt_encoder,
            params.max_level_q(),
            params.default_scale,
            log_slots,
        )
        .unwrap();

        let mut lt_encoder = LinearTransformEncoder::new(&encoder, diagonals);
        let lt_bsgs = LinearTransform::new_bsgs(
            &params,
            &mut lt_encoder,
            params.max_level_q(),
            params.default_scale,
            log_slots,
            1,
        )
        .unwrap();

        // baby and giant steps of the split may need rotations outside [-8, 8]
        let mut bsgs_elements = galois_elements.clone();
        bsgs_elements.extend(
            lt_bsgs
                .rotations()
                .into_iter()
                .map(|k| params.galois_element_for_column_rotation_by(k as isize)),
        );
        let bsgs_elements = bsgs_elements
            .into_iter()
            .filter(|g| *g != 1)
            .unique()
            .collect_vec();
        let bsgs_evaluator = Evaluator::new(params.clone(), rotation_keys(&params, &bsgs_elements));

        group.bench_function(
            BenchmarkId::new("linear_transform_naive", format!("n={}/logq={logq}", params.degree)),
            |b| {
                b.iter(|| evaluator.linear_transform(&ct, &lt_naive).unwrap());
            },
        );

        group.bench_function(
            BenchmarkId::new("linear_transform_bsgs", format!("n={}/logq={logq}", params.degree)),
            |b| {
                b.iter(|| bsgs_evaluator.linear_transform(&ct, &lt_bsgs).unwrap());
            },
        );
    }
}

criterion_group!(evaluator, bench_evaluator);
criterion_main!(evaluator);
