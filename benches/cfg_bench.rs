use criterion::{black_box, criterion_group, criterion_main, Criterion};
use irflow::compiler::cfg::{BlockIdGenerator, CfgBuilder};
use irflow::compiler::ir::{Class, Instruction, Label, Method, Operand, Script};
use irflow::compiler::lowering::Lowerer;
use irflow::compiler::scope::ScopeStack;

/// A routine of `loops` counted loops laid end to end
fn loop_heavy_method(loops: u32) -> Method {
    let mut instrs = Vec::new();
    for i in 0..loops {
        let head = Label(i * 2);
        let done = Label(i * 2 + 1);
        instrs.push(Instruction::copy("i", Operand::fixnum(0)));
        instrs.push(Instruction::label(head));
        instrs.push(Instruction::branch(Operand::var("i"), Operand::fixnum(100), done));
        instrs.push(Instruction::call(Some("i"), "succ", vec![Operand::var("i")]));
        instrs.push(Instruction::put_field(Operand::var("self"), "total", Operand::var("i")));
        instrs.push(Instruction::jump(head));
        instrs.push(Instruction::label(done));
    }
    instrs.push(Instruction::ret(Operand::var("i")));
    Method::new("run", instrs)
}

fn cfg_benchmark(c: &mut Criterion) {
    let method = loop_heavy_method(200);

    c.bench_function("build cfg 200 loops", |b| {
        b.iter(|| {
            let mut ids = BlockIdGenerator::new();
            CfgBuilder::new(&mut ids)
                .build_method("Main#run", black_box(&method))
                .unwrap()
        })
    });
}

fn lowering_benchmark(c: &mut Criterion) {
    let script = Script::new(
        "bench.rb",
        Class::new("Main").with_method(loop_heavy_method(200)),
    );

    c.bench_function("lower script 200 loops", |b| {
        b.iter(|| {
            let mut scopes = ScopeStack::new();
            let mut lowerer = Lowerer::new(Vec::new());
            lowerer.lower_script(&mut scopes, black_box(&script)).unwrap();
            lowerer.finish()
        })
    });
}

criterion_group!(benches, cfg_benchmark, lowering_benchmark);
criterion_main!(benches);
