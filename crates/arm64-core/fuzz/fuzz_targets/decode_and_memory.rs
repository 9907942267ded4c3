#![no_main]

use std::sync::OnceLock;

use arm64_core::{
    DecodeTable, ExecutionContext, MemoryConfig, MemoryManager, TranslatorConfig, Translator,
};
use libfuzzer_sys::fuzz_target;

const CODE: u64 = 0x1000;

fn table() -> &'static DecodeTable {
    static TABLE: OnceLock<DecodeTable> = OnceLock::new();
    TABLE.get_or_init(|| DecodeTable::a64().expect("built-in patterns are valid"))
}

fuzz_target!(|data: &[u8]| {
    if data.len() < 12 {
        return;
    }

    let word = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
    let va = u64::from_le_bytes([
        data[4], data[5], data[6], data[7], data[8], data[9], data[10], data[11],
    ]);
    let payload = &data[12..];

    let _ = table().decode(word, CODE);

    let memory = MemoryManager::with_ram_size(0x4000, &MemoryConfig::default())
        .expect("small arena allocates");
    memory.map(CODE, 0, 0x2000).expect("fixed mapping is valid");

    let _ = memory.write_bytes(va, payload);
    let _ = memory.read_bytes(va, payload.len());
    let _ = memory.read_u64(va);
    let _ = memory.write_u32(va, word);
    let _ = memory.compare_exchange_i32(va, 0, word as i32);
    let _ = memory.compare_exchange_u128(va, 0, u128::from(word));
    let _ = memory.unmap(va & !0xFFF, 0x1000);

    // Run the word as a one-instruction subroutine followed by `ret`.
    let memory = MemoryManager::with_ram_size(0x4000, &MemoryConfig::default())
        .expect("small arena allocates");
    memory.map(CODE, 0, 0x2000).expect("fixed mapping is valid");
    memory.write_u32(CODE, word).expect("mapped");
    memory.write_u32(CODE + 4, 0xD65F_03C0).expect("mapped");
    let config = TranslatorConfig {
        max_function_instructions: 16,
        ..TranslatorConfig::default()
    };
    let translator = Translator::new(
        std::sync::Arc::new(memory),
        std::sync::Arc::new(DecodeTable::a64().expect("built-in patterns are valid")),
        config,
    );
    let mut context = ExecutionContext::new(1);
    // Backward branches exit immediately so self-loops terminate.
    context.request_stop();
    let _ = translator.execute(&mut context, CODE);
});
