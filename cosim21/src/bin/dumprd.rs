use std::env;
use std::error::Error;
use std::process;

use cosim21::read;
use cosim21::utils::SerializationFormat::Yaml;
use cosim21::TraceMap;

struct Config {
    indump: String,
    outyaml: String,
}

impl Config {
    fn new(args: &[String]) -> Result<Config, &'static str> {
        if args.len() < 3 {
            return Err("Not enough arguments, expecting 2.");
        }
        let indump = args[1].clone();
        let outyaml = args[2].clone();
        Ok(Config { indump, outyaml })
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let args: Vec<String> = env::args().collect();
    let cfg = Config::new(&args)?;
    let dump = read::parse_file(cfg.indump)?;
    let traces = read::reconstruct(&dump, &TraceMap::new())?;
    Yaml.save(&traces, cfg.outyaml)?;
    Ok(())
}
fn main() {
    run().unwrap_or_else(|err| {
        println!("Problem in dumprd: {}", err);
        process::exit(1);
    });
}
