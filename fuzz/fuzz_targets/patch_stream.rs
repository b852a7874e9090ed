#![no_main]

use cilpatch::{
    assembly::{ExceptionBlock, Instruction, InstructionStream, OpCode, StreamEncoder, TokenTable},
    host,
    patch::EngineConfig,
};
use libfuzzer_sys::fuzz_target;

fn build(method: &str, data: &[u8]) -> InstructionStream {
    let mut stream = InstructionStream::new(method);
    let labels: Vec<_> = (0..4).map(|_| stream.define_label()).collect();

    for pair in data.chunks(2) {
        let op = pair[0];
        let arg = pair.get(1).copied().unwrap_or(0);
        let label = labels[usize::from(arg) % labels.len()];
        let mut instruction = match op % 10 {
            0 => Instruction::load_local_address(u16::from(arg)),
            1 => Instruction::load_int(i32::from(arg as i8)),
            2 => Instruction::call(host::intvec3_constructor()),
            3 => Instruction::callvirt(host::listing_new_column()),
            4 => Instruction::branch(OpCode::Brtrue, label),
            5 => Instruction::store_local(u16::from(arg)),
            6 => Instruction::new(OpCode::Ldarg1),
            7 => Instruction::new(OpCode::Pop),
            8 => Instruction::new(OpCode::Dup),
            _ => Instruction::new(OpCode::Nop),
        };
        if op & 0x10 != 0 {
            instruction = instruction.labeled(label);
        }
        if op & 0x20 != 0 {
            instruction = instruction.with_block(ExceptionBlock::BeginTry);
        }
        stream.push(instruction);
    }
    stream
}

fuzz_target!(|data: &[u8]| {
    let Ok(engine) = host::default_engine(EngineConfig::default()) else {
        return;
    };

    let mut tokens = TokenTable::new();
    for method in [
        host::intvec3_constructor(),
        host::create_custom_vector_ref(),
        host::listing_new_column(),
        host::new_column_hook(),
    ] {
        tokens.register_method(&method);
    }

    for method in [host::INIT_NEW_GAME, host::ADVANCED_CONFIG_WINDOW] {
        let stream = build(method, data);
        let before = stream.metadata_count();
        let report = engine.patch_method(stream);
        assert_eq!(report.stream.metadata_count(), before);
        let _ = StreamEncoder::new().encode(&report.stream, &tokens);
    }
});
