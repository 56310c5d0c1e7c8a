mod roundtrip;
mod utils;
