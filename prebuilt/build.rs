use vergen_gix::{Emitter, GixBuilder};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // `VERGEN_GIT_SHA` and `VERGEN_GIT_COMMIT_DATE` feed `prebuilt --version`.  Outside a git
    // checkout (a crates.io tarball) they are emitted as placeholders and the version is printed
    // alone.
    let git = GixBuilder::default().sha(true).commit_date(true).build()?;

    Emitter::default().add_instructions(&git)?.emit()?;

    Ok(())
}
