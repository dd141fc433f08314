//! Quote Client
//!
//! Minimal client for smoke-testing a running slipquote server: sends one
//! framed `expected_slippage` request and prints the raw response line.
//!
//! Usage:
//!   quote_client --addr 127.0.0.1:9000 --instrument BTC --order-size 100
//!   quote_client --instrument ETH --book ./snapshot.json

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use slipquote::book::{BookLevel, OrderBookSnapshot};
use slipquote::protocol::{Method, RequestEnvelope, SlippageParams};

#[derive(Parser, Debug)]
#[command(name = "quote_client")]
#[command(about = "Request one slippage quote from a running slipquote server")]
struct Args {
    /// Server address
    #[arg(long, env = "SLIPQUOTE_ADDR", default_value = "127.0.0.1:9000")]
    addr: String,

    /// Instrument symbol to quote
    #[arg(long)]
    instrument: String,

    /// USD notional of the simulated order
    #[arg(long, default_value_t = 100.0)]
    order_size: f64,

    /// Snapshot JSON file with asks/bids; a small demo book is used if omitted
    #[arg(long)]
    book: Option<PathBuf>,

    /// Optional volatility context, passed through to the server
    #[arg(long)]
    volatility: Option<f64>,

    /// Optional fee context, passed through to the server
    #[arg(long)]
    fee: Option<f64>,
}

fn demo_book() -> OrderBookSnapshot {
    OrderBookSnapshot {
        asks: vec![
            BookLevel::new(105.2, 1.0),
            BookLevel::new(105.3, 1.5),
            BookLevel::new(105.4, 1.5),
        ],
        bids: vec![
            BookLevel::new(105.0, 1.0),
            BookLevel::new(104.9, 1.5),
            BookLevel::new(104.8, 1.0),
        ],
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let book = match &args.book {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?
        }
        None => demo_book(),
    };

    let params = SlippageParams {
        instrument: args.instrument,
        book,
        order_sz: Some(args.order_size),
        volatility_pct: args.volatility,
        fee_pct: args.fee,
    };
    let request = RequestEnvelope {
        method: Method::ExpectedSlippage.name().to_string(),
        params: serde_json::to_value(&params).context("encoding params")?,
    };
    let line = serde_json::to_string(&request).context("encoding request")?;

    let stream = TcpStream::connect(&args.addr)
        .await
        .with_context(|| format!("connecting to {}", args.addr))?;
    let (read_half, mut write_half) = stream.into_split();

    write_half.write_all(line.as_bytes()).await?;
    write_half.write_all(b"\n").await?;
    write_half.flush().await?;

    let mut response = String::new();
    let n = BufReader::new(read_half).read_line(&mut response).await?;
    if n == 0 {
        bail!("server closed the connection without responding");
    }

    println!("{}", response.trim_end());
    Ok(())
}
