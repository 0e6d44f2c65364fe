// The command-line front-end is a thin external client of this engine and is not
// built from this crate, so there is nothing for a build script to generate here.
fn main() {}
