#![no_main]

use libfuzzer_sys::fuzz_target;
use rastro::config::{TraceConfig, DEFAULT_TRACE_LIST};
use rastro::registry::validate_target_path;

fuzz_target!(|data: &[u8]| {
    // Neither syntax may panic on arbitrary input, and every parsed target
    // must survive identifier validation without panicking.
    if let Ok(input) = std::str::from_utf8(data) {
        for parsed in [
            TraceConfig::from_json_str(input, DEFAULT_TRACE_LIST),
            TraceConfig::from_toml_str(input, DEFAULT_TRACE_LIST),
        ] {
            if let Ok(config) = parsed {
                for target in &config.targets {
                    let _ = validate_target_path(target);
                }
            }
        }
    }
});
