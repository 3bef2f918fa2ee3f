use anyhow::Result;

fn main() -> Result<()> {
    wordvec_cli::main_entry()
}
