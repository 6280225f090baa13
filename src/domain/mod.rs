// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust types that describe the training problem:
// the named loss terms and their weights, and the mask
// abstraction used by the data pipeline.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O
//   - Only plain Rust structs, enums, and traits

// Loss term names, coefficients and step reports
pub mod losses;

// Core abstractions (traits) that other layers implement
pub mod traits;
