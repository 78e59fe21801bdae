use std::process;

// Keep this shim empty of logic; everything lives in lazyrepo_lib::main so
// it can be exercised from tests.
fn main() {
    process::exit(lazyrepo_lib::main());
}
