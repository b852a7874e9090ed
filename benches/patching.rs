//! Benchmarks for patching and encoding.
//!
//! Measures the hot paths of a load-time patch pass:
//! - Redirecting constructor calls in bodies of growing size
//! - Inserting a call hook into a branching body
//! - Encoding a patched body back to bytes

extern crate cilpatch;

use cilpatch::{
    assembly::{Instruction, InstructionStream, OpCode, StreamEncoder, TokenTable},
    host,
    patch::EngineConfig,
};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;

/// A body with `sites` map-size constructions, every other anchor carrying a branch target.
fn construction_body(method: &str, sites: usize) -> InstructionStream {
    let mut stream = InstructionStream::new(method);
    for site in 0..sites {
        let slot = u16::try_from(site % 200).unwrap();
        let mut anchor = Instruction::load_local_address(slot);
        if site % 2 == 0 {
            let label = stream.define_label();
            stream.push(Instruction::new(OpCode::Ldarg0));
            stream.push(Instruction::branch(OpCode::Brfalse, label));
            anchor = anchor.labeled(label);
        }
        stream.push(anchor);
        stream.push(Instruction::load_int(-1));
        stream.push(Instruction::load_int(0));
        stream.push(Instruction::load_int(-1));
        stream.push(Instruction::call(host::intvec3_constructor()));
    }
    stream.push(Instruction::new(OpCode::Ret));
    stream
}

/// A dialog body with a conditional jump onto the column break.
fn dialog_body() -> InstructionStream {
    let mut stream = InstructionStream::new(host::ADVANCED_CONFIG_WINDOW);
    let column = stream.define_label();
    stream.push(Instruction::new(OpCode::Ldarg1));
    stream.push(Instruction::branch(OpCode::Brtrue, column));
    for _ in 0..32 {
        stream.push(Instruction::new(OpCode::Nop));
    }
    stream.push(Instruction::new(OpCode::Ldarg1));
    stream.push(Instruction::callvirt(host::listing_new_column()).labeled(column));
    stream.push(Instruction::new(OpCode::Ret));
    stream
}

fn bench_redirect(c: &mut Criterion) {
    let engine = host::default_engine(EngineConfig::default()).unwrap();
    let mut group = c.benchmark_group("redirect_constructor");

    for sites in [1usize, 16, 256] {
        let body = construction_body(host::INIT_NEW_GAME, sites);
        group.bench_with_input(BenchmarkId::from_parameter(sites), &body, |b, body| {
            b.iter(|| {
                let report = engine.patch_method(black_box(body.clone()));
                black_box(report)
            });
        });
    }

    group.finish();
}

fn bench_insert_hook(c: &mut Criterion) {
    let engine = host::default_engine(EngineConfig::default()).unwrap();
    let body = dialog_body();

    c.bench_function("insert_after_call", |b| {
        b.iter(|| {
            let report = engine.patch_method(black_box(body.clone()));
            black_box(report)
        });
    });
}

fn bench_encode(c: &mut Criterion) {
    let engine = host::default_engine(EngineConfig::default()).unwrap();
    let patched = engine
        .patch_method(construction_body(host::INIT_NEW_GAME, 256))
        .stream;

    let mut tokens = TokenTable::new();
    tokens.register_method(&host::create_custom_vector_ref());

    c.bench_function("encode_patched_body", |b| {
        b.iter(|| {
            let body = StreamEncoder::new()
                .encode(black_box(&patched), &tokens)
                .unwrap();
            black_box(body)
        });
    });
}

criterion_group!(benches, bench_redirect, bench_insert_hook, bench_encode);
criterion_main!(benches);
