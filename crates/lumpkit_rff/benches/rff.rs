use divan::AllocProfiler;

#[global_allocator]
static ALLOC: AllocProfiler = AllocProfiler::system();

fn main() {
    divan::main();
}

pub mod read {
    use binrw::BinWrite;
    use divan::Bencher;
    use lumpkit_rff::cipher::{blood_crypt, BloodCipher};
    use lumpkit_rff::types::{RffHeader, RffRecord};
    use lumpkit_rff::RffArchive;
    use std::io::{prelude::*, Cursor};

    const ENTRIES: u32 = 512;
    const ENTRY_SIZE: u32 = 1024;

    fn get_input() -> Vec<u8> {
        let mut data = vec![0x5Au8; (ENTRIES * ENTRY_SIZE) as usize];
        let mut table = Cursor::new(Vec::new());
        for i in 0..ENTRIES {
            let offset = RffHeader::SIZE as u32 + i * ENTRY_SIZE;
            let encrypted = i % 2 == 0;
            if encrypted {
                let start = (i * ENTRY_SIZE) as usize;
                BloodCipher::for_payload().apply(&mut data[start..start + ENTRY_SIZE as usize]);
            }

            let mut record = RffRecord {
                data_offset: offset,
                data_size: ENTRY_SIZE,
                flags: if encrypted { 0x10 } else { 0 },
                extension: *b"RAW",
                ..Default::default()
            };
            let name = format!("E{:05}", i);
            record.name[..name.len()].copy_from_slice(name.as_bytes());
            record.write(&mut table).unwrap();
        }

        let header = RffHeader {
            directory_offset: RffHeader::SIZE as u32 + data.len() as u32,
            entries: ENTRIES,
            ..Default::default()
        };
        let mut table = table.into_inner();
        blood_crypt(&mut table, header.directory_offset as u8);

        let mut out = Cursor::new(Vec::new());
        header.write(&mut out).unwrap();
        let mut out = out.into_inner();
        out.extend(data);
        out.extend(table);
        out
    }

    #[divan::bench]
    fn open(bencher: Bencher) {
        bencher.with_inputs(get_input).bench_refs(|data| {
            divan::black_box(RffArchive::new(Cursor::new(data)).unwrap());
        });
    }

    #[divan::bench]
    fn probe(bencher: Bencher) {
        bencher.with_inputs(get_input).bench_refs(|data| {
            divan::black_box(lumpkit_rff::is_rff(Cursor::new(data)));
        });
    }

    #[divan::bench(sample_count = 1)]
    fn read_file_all(bencher: Bencher) {
        let mut rff = RffArchive::new(Cursor::new(get_input())).unwrap();

        bencher.bench_local(move || {
            let mut buffer = Vec::new();
            for i in 0..rff.len() {
                let mut file = rff.by_index(i).unwrap();
                file.read_to_end(&mut buffer).unwrap();
                buffer.clear();
            }
        });
    }
}
