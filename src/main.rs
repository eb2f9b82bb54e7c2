use classroom::{create_db_if_needed, setup_log, start_server};
use log::error;
use nu_ansi_term::Color::Red;

#[tokio::main]
async fn main() {
    setup_log();

    let schema_name = "classroom";

    if let Err(e) = create_db_if_needed(schema_name).await {
        error!("{}", Red.paint("Could not prepare the database. Is it running?").to_string());
        error!("{}", Red.paint(format!("{}", e)).to_string());
        return;
    }

    if let Err(e) = start_server(schema_name, 8787).await {
        error!("{}", Red.paint("Could not start server.").to_string());
        error!("{}", Red.paint(format!("{}", e)).to_string());
    };
}
