#![no_main]

use libfuzzer_sys::fuzz_target;
use tpl_core::{expand, flatten, FlatKey, FlatMap, FlatValue};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let flat: FlatMap = text
        .lines()
        .map(|line| (FlatKey::new(line), FlatValue::string(line)))
        .collect();
    for key in flat.keys() {
        let _ = key.segments();
    }
    let nested = expand(&flat);
    let again = flatten(&nested, &FlatKey::root());
    assert_eq!(expand(&again), nested);
});
