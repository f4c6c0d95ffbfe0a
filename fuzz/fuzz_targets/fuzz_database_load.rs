#![no_main]
use geolocations::{DataValue, FindAllOptions, Location, Reader};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Never crash or panic, even on garbage input
    let Ok(reader) = Reader::from_bytes(data.to_vec()) else {
        return;
    };

    for ip in ["1.2.3.4", "81.2.69.160", "::1", "2001:db8::1"] {
        let _ = reader.find_str::<Location>(ip);
        let _ = reader.find_str::<DataValue>(ip);
    }

    // Bounded walk over whatever tree the input describes
    for record in reader
        .find_all::<DataValue>(FindAllOptions::default(), None)
        .take(1024)
    {
        if record.is_err() {
            break;
        }
    }
});
