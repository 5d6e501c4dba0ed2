use mcp_server_datahub::cli::{print_error_and_exit, run};

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        print_error_and_exit(err);
    }
}
