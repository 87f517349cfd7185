/// Entry point for the `fine-coverage` binary.
fn main() -> anyhow::Result<()> {
    fine_coverage::cli::run()
}
