//
// Copyright (c) 2025 Nathan Fiedler
//
use clap::{Arg, ArgAction, arg, command, value_parser};
use varchunk::index::DedupIndex;
use varchunk::planner::{Bucketing, ChunkMode, PlannerConfig};
use varchunk::report;
use varchunk::source::MappedFile;

fn main() {
    env_logger::init();
    let matches = command!("Example of producing a chunk report.")
        .about("Chunks files by content and reports each chunk with its MD5 digest.")
        .arg(
            arg!(
                -d --divisor <DIVISOR> "File size is divided by this to pick the chunk size."
            )
            .value_parser(value_parser!(u64)),
        )
        .arg(
            arg!(
                -p --power <POWER> "Anchor power from an earlier scan."
            )
            .value_parser(value_parser!(u32)),
        )
        .arg(
            arg!(
                -r --refactor <STEPS> "Re-anchor when the size grows by this many powers of two."
            )
            .value_parser(value_parser!(u32)),
        )
        .arg(arg!(--fibonacci "Round chunk sizes to Fibonacci numbers."))
        .arg(arg!(--fixed "Cut fixed size chunks."))
        .arg(arg!(--whole "Treat every file as a single block."))
        .arg(arg!(--stats "Print index statistics at the end."))
        .arg(
            Arg::new("INPUT")
                .help("Sets the input files to use")
                .required(true)
                .action(ArgAction::Append)
                .index(1),
        )
        .get_matches();
    let divisor = *matches.get_one::<u64>("divisor").unwrap_or(&32);
    let power = *matches.get_one::<u32>("power").unwrap_or(&0);
    let mut config = PlannerConfig::with_divisor(divisor);
    config.refactor = *matches.get_one::<u32>("refactor").unwrap_or(&0);
    if matches.get_flag("fibonacci") {
        config.bucketing = Bucketing::Fibonacci;
    }
    if matches.get_flag("fixed") {
        config.mode = ChunkMode::Fixed;
    }
    if matches.get_flag("whole") {
        config.mode = ChunkMode::WholeFile;
    }
    let mut index: DedupIndex = DedupIndex::new(0);
    for filename in matches.get_many::<String>("INPUT").unwrap() {
        let mapped = MappedFile::open(filename).expect("cannot map file!");
        println!("# {}", filename);
        for record in report::scan(&mapped, &config, power, &mut index) {
            println!("{}", record);
        }
    }
    if matches.get_flag("stats") {
        println!("{}", index.stats());
    }
}
