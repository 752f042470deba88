use clap::Parser;
use collab_client::{Cli, run};

#[tokio::main]
async fn main() {
    let code = match run(Cli::parse()).await {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("error: {e}");
            1
        }
    };
    // A watch view may leave a blocking stdin read behind; do not wait for it
    std::process::exit(code);
}
