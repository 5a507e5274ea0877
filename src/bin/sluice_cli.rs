use std::{
    error::Error,
    io::{self, Write},
    time::Duration,
};

use clap::Parser;
use sluice::{
    BatchSize, Client, ClientOptions, Command, QueryFuture, QueryOptions,
    SessionKind, Transaction, TransactionKind,
    cli::{CommandError, parse_batch_size},
    prompt,
};

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Server address, e.g. 127.0.0.1:1729
    address: String,
    /// Database to open a session on
    database: String,
    /// Open a schema session instead of a data session
    #[arg(long)]
    schema: bool,
    /// Open write transactions instead of read transactions
    #[arg(long)]
    write: bool,
    /// Answers per round trip: a positive integer or 'all'
    #[arg(long, value_parser = parse_batch_size, default_value = "50")]
    batch_size: BatchSize,
    /// Bound on connecting and on waiting for the first batch of a query
    #[arg(long)]
    timeout_ms: Option<u64>,
}

fn main() -> Result<(), Box<dyn Error>> {
    // Initialize env_logger; For logging to STDOUT/STDERR
    env_logger::init();

    let cli = Cli::parse();
    let timeout = cli.timeout_ms.map(Duration::from_millis);
    let options = ClientOptions {
        connect_timeout: timeout,
        request_timeout: timeout,
        ..Default::default()
    };

    let client = Client::connect(cli.address.as_str(), options)?;
    let handle = client.clone();
    ctrlc::set_handler(move || {
        handle.close();
        std::process::exit(130);
    })?;

    let session_kind = if cli.schema {
        SessionKind::Schema
    } else {
        SessionKind::Data
    };
    let tx_kind = if cli.write {
        TransactionKind::Write
    } else {
        TransactionKind::Read
    };

    let session = client.session(&cli.database, session_kind)?;
    let mut tx = session.transaction(tx_kind)?;
    let mut query_options = QueryOptions::from(cli.batch_size);

    loop {
        let cmd = match prompt(io::stdin().lock(), io::stdout().lock()) {
            Ok(c) => c,
            Err(CommandError::Closed) => break,
            Err(CommandError::Empty) => continue,
            Err(e) => {
                eprintln!("{e}");
                continue;
            }
        };

        match cmd {
            Command::Exit => break,
            Command::Batch(size) => {
                query_options = QueryOptions::from(size);
                println!("batch size set to {size:?}");
            }
            Command::Commit => {
                if let Err(e) = tx.commit() {
                    eprintln!("commit failed: {e}");
                }
                tx = session.transaction(tx_kind)?;
            }
            Command::Rollback => {
                if let Err(e) = tx.rollback() {
                    eprintln!("rollback failed: {e}");
                }
            }
            Command::Query(query) => {
                if let Err(e) = run_query(&tx, query, query_options, timeout) {
                    eprintln!("query error: {e}");
                }
            }
        }
    }

    drop(tx);
    drop(session);
    client.close();
    Ok(())
}

fn run_query(
    tx: &Transaction,
    query: String,
    options: QueryOptions,
    timeout: Option<Duration>,
) -> Result<(), Box<dyn Error>> {
    let mut future = tx.stream::<Vec<u8>>(query, options)?;
    let answers = match timeout {
        Some(timeout) => future.get_timeout(timeout)?,
        None => future.get()?,
    };

    let mut stdout = io::stdout().lock();
    let mut count = 0;
    for answer in answers {
        let answer = answer?;
        writeln!(stdout, "{}", String::from_utf8_lossy(&answer))?;
        count += 1;
    }
    writeln!(
        stdout,
        "{count} answer(s) in {} batch(es)",
        future.iterator().batch_sizes().len()
    )?;
    Ok(())
}
