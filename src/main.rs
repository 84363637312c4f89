use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    ollamacode::cli::main()
}
