use roll_call::{Config, audit_session, follow_display, init_tracing, rotate_expired_codes};

fn print_usage(bin_name: &str) {
    eprintln!("Usage:");
    eprintln!("  {bin_name} rotate-codes");
    eprintln!("  {bin_name} audit <session-id>");
    eprintln!("  {bin_name} display <session-id>");
}

enum Command {
    RotateCodes,
    Audit(String),
    Display(String),
}

fn parse_command(args: &[String]) -> Option<Command> {
    match args {
        [command] if command == "rotate-codes" => Some(Command::RotateCodes),
        [command, session_id] if command == "audit" => Some(Command::Audit(session_id.clone())),
        [command, session_id] if command == "display" => Some(Command::Display(session_id.clone())),
        _ => None,
    }
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    let mut args = std::env::args();
    let bin_name = args.next().unwrap_or_else(|| "cron".to_string());
    let rest: Vec<String> = args.collect();

    let Some(command) = parse_command(&rest) else {
        print_usage(&bin_name);
        std::process::exit(2);
    };

    let config = match Config::load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Failed to load configuration: {err}");
            std::process::exit(1);
        }
    };

    init_tracing(&config.logging.level, config.logging.json_format);

    let result = match command {
        Command::RotateCodes => rotate_expired_codes(&config).await.map(|summary| {
            println!("Code rotation completed: sessions_rotated={}", summary.sessions_rotated);
        }),
        Command::Audit(session_id) => audit_session(&config, &session_id).await.and_then(|summary| {
            println!("{}", summary.to_json()?);
            if !summary.is_clean() {
                std::process::exit(3);
            }
            Ok(())
        }),
        Command::Display(session_id) => follow_display(&config, &session_id).await,
    };

    if let Err(err) = result {
        eprintln!("Cron job failed: {err}");
        std::process::exit(1);
    }
}
