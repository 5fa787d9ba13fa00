//
// Copyright (c) 2025 Nathan Fiedler
//
use clap::{Arg, arg, command, value_parser};
use std::fs::File;
use std::io::Read;
use varchunk::index::DedupIndex;

fn main() {
    env_logger::init();
    let matches = command!("Example of building a block index.")
        .about("Indexes a file in fixed size blocks, or looks up blocks of a file in a saved index.")
        .arg(
            arg!(
                -b --block <SIZE> "Size of the blocks in bytes."
            )
            .value_parser(value_parser!(u32)),
        )
        .arg(arg!(-o --output <INDEX> "Save the index to this file."))
        .arg(arg!(-i --index <INDEX> "Look up the blocks of INPUT in this saved index."))
        .arg(
            Arg::new("INPUT")
                .help("Sets the input file to use")
                .required(true)
                .index(1),
        )
        .get_matches();
    let filename = matches.get_one::<String>("INPUT").unwrap();
    if let Some(saved) = matches.get_one::<String>("index") {
        let index: DedupIndex = DedupIndex::read_from_file(saved).expect("cannot load index!");
        println!("{}", index.stats());
        let block_size = index.block_size() as usize;
        assert!(block_size > 0, "saved index does not use fixed size blocks");
        let mut file = File::open(filename).expect("cannot open file!");
        let mut block = vec![0u8; block_size];
        let mut offset: u64 = 0;
        loop {
            block.fill(0);
            let mut filled = 0;
            while filled < block_size {
                let n = file.read(&mut block[filled..]).expect("cannot read file!");
                if n == 0 {
                    break;
                }
                filled += n;
            }
            if filled == 0 {
                break;
            }
            if let Some(blocks) = index.find_all_matches_data(&block, 8) {
                println!("offset={} matches blocks {:?}", offset, blocks);
            }
            offset += filled as u64;
            if filled < block_size {
                break;
            }
        }
    } else {
        let block_size = *matches.get_one::<u32>("block").unwrap_or(&4096);
        let index: DedupIndex =
            DedupIndex::from_file(filename, block_size).expect("cannot index file!");
        println!("{}", index.stats());
        if let Some(output) = matches.get_one::<String>("output") {
            let size = index.write_to_file(output).expect("cannot save index!");
            println!("wrote {} bytes to {}", size, output);
        }
    }
}
