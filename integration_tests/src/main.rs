//! Integration tests for the dual UART bridge firmware.
//!
//! Run after flashing the firmware, with TX jumpered to RX on both UARTs.

mod device;

use clap::Parser;
use colored::Colorize;

use device::{resolve_ports, BridgePort};
use tests::{print_results, run_all_tests, Bridge};

#[derive(Parser)]
#[command(name = "integration-tests")]
#[command(about = "Loopback tests for the dual UART bridge")]
struct Args {
    /// Serial port for CDC interface 0 (use "auto" to auto-detect)
    #[arg(long, default_value = "auto")]
    port0: String,

    /// Serial port for CDC interface 1 (use "auto" to auto-detect)
    #[arg(long, default_value = "auto")]
    port1: String,

    /// Baud rate
    #[arg(short, long, default_value = "115200")]
    baud: u32,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Resolve ports (auto-detect if "auto")
    let (port0, port1) = resolve_ports(&args.port0, &args.port1)?;

    println!("{}", "UART Bridge Integration Tests".bold());
    println!("Port 0: {}", port0);
    println!("Port 1: {}", port1);
    println!("Baud: {}", args.baud);
    println!();

    println!("Connecting to device...");
    let mut bridge = Bridge {
        ch0: BridgePort::open(&port0, args.baud)?,
        ch1: BridgePort::open(&port1, args.baud)?,
        baud: args.baud,
    };

    // Give the line-coding change time to reach both UARTs
    std::thread::sleep(std::time::Duration::from_millis(200));
    println!("{}", "Connected!".green());

    println!("\nRunning tests...\n");

    let results = run_all_tests(&mut bridge);
    print_results(&results);

    // Exit with error code if any tests failed
    let failed = results.iter().filter(|r| !r.passed).count();
    if failed > 0 {
        std::process::exit(1);
    }

    Ok(())
}
