// SPDX-License-Identifier: MIT
//
// Thin CLI harness demonstrating put/get/del/stat against a BehaviorDB
// directory. Out of scope as a production surface; useful for poking at
// an engine instance by hand.

use std::env;
use std::process::ExitCode;

use behaviordb::{Config, Engine};

fn usage() -> ! {
    eprintln!(
        "usage: bdbctl <root_dir> put <data>\n       bdbctl <root_dir> get <handle>\n       bdbctl <root_dir> del <handle>\n       bdbctl <root_dir> stat"
    );
    std::process::exit(2);
}

fn main() -> ExitCode {
    env_logger::init();
    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        usage();
    }
    let root_dir = &args[1];
    let cmd = args[2].as_str();
    let mut engine = match Engine::open(Config::builder(root_dir).build()) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("open failed: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = match cmd {
        "put" => {
            let Some(data) = args.get(3) else { usage() };
            engine.put(data.as_bytes()).map(|h| println!("{h}"))
        }
        "get" => {
            let Some(handle) = args.get(3).and_then(|s| s.parse().ok()) else { usage() };
            let mut buf = vec![0u8; 1 << 20];
            engine.get(handle, 0, &mut buf).map(|n| {
                print!("{}", String::from_utf8_lossy(&buf[..n]));
            })
        }
        "del" => {
            let Some(handle) = args.get(3).and_then(|s| s.parse().ok()) else { usage() };
            engine.del(handle)
        }
        "stat" => {
            let stats = engine.stats();
            for pool in &stats.pools {
                println!("dir={:02} chunk_size={:<8} acquired={}", pool.dir, pool.chunk_size, pool.acquired);
            }
            println!("handles_acquired={} range={:?}", stats.handles_acquired, stats.handle_range);
            Ok(())
        }
        _ => usage(),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
