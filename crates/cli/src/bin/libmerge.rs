use anyhow::Result;

fn main() -> Result<()> {
    libmerge_cli::main_entry()
}
