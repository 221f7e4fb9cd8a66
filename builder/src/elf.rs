// Licensed under the Apache-2.0 license

//! Ingest a linked ELF executable into the [`LinkedBinary`] model the
//! extractor consumes: allocated sections with their storage (load) and RAM
//! (virtual) addresses, plus the layout symbols the program's own startup
//! code uses to copy `.data` and zero `.bss`.

use elf::abi::{PT_LOAD, SHF_ALLOC, SHT_NOBITS};
use elf::endian::AnyEndian;
use elf::ElfBytes;

use crate::error::{BuildError, Result};

/// Linker symbols the startup code reads; the extractor cross-checks them
/// against the actual section layout instead of trusting either side.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LayoutSymbols {
    /// Storage address of the `.data` template.
    pub data_lma: u32,
    /// RAM address `.data` is copied to at boot.
    pub data_vma: u32,
    /// Byte length of `.data`.
    pub data_size: u32,
    /// RAM address of the zero-initialized region.
    pub bss_vma: u32,
    /// Byte length of the zero-initialized region.
    pub bss_size: u32,
}

const REQUIRED_SYMBOLS: [&str; 5] = [
    "_data_lma",
    "_data_vma",
    "_data_size",
    "_bss_vma",
    "_bss_size",
];

/// One allocated section with content. `load_addr` is where the bytes live
/// in storage; `virt_addr` is where the program addresses them at run time.
/// The two are equal for execute-in-place sections and differ for the
/// `.data` template.
#[derive(Debug, Clone)]
pub struct Section {
    pub name: String,
    pub load_addr: u32,
    pub virt_addr: u32,
    pub data: Vec<u8>,
}

impl Section {
    /// Execute-in-place sections live at their run-time address.
    pub fn is_xip(&self) -> bool {
        self.load_addr == self.virt_addr
    }
}

/// The extractor's input: the layout of a linked, position-fixed binary.
#[derive(Debug, Clone)]
pub struct LinkedBinary {
    /// Allocated sections with content, ordered by load address.
    pub sections: Vec<Section>,
    pub layout: LayoutSymbols,
    pub entry: u32,
}

impl LinkedBinary {
    pub fn from_elf(bytes: &[u8]) -> Result<Self> {
        let file = ElfBytes::<AnyEndian>::minimal_parse(bytes)
            .map_err(|e| BuildError::Elf(format!("failed to parse ELF: {e:?}")))?;

        let Some(segments) = file.segments() else {
            return Err(BuildError::Elf("ELF has no program headers".to_string()));
        };
        let load_segments: Vec<(u64, u64, u64)> = segments
            .iter()
            .filter(|s| s.p_type == PT_LOAD && s.p_memsz > 0)
            .map(|s| (s.p_vaddr, s.p_paddr, s.p_memsz))
            .collect();
        if load_segments.is_empty() {
            return Err(BuildError::Elf("ELF has no LOAD segments".to_string()));
        }

        let (shdrs, strtab) = file
            .section_headers_with_strtab()
            .map_err(|e| BuildError::Elf(format!("failed to read section headers: {e:?}")))?;
        let (Some(shdrs), Some(strtab)) = (shdrs, strtab) else {
            return Err(BuildError::Elf("ELF has no section headers".to_string()));
        };

        let mut sections = Vec::new();
        for shdr in shdrs.iter() {
            if shdr.sh_flags & SHF_ALLOC as u64 == 0
                || shdr.sh_type == SHT_NOBITS
                || shdr.sh_size == 0
            {
                continue;
            }
            let name = strtab
                .get(shdr.sh_name as usize)
                .map_err(|e| BuildError::Elf(format!("bad section name: {e:?}")))?
                .to_string();
            let (data, compression) = file
                .section_data(&shdr)
                .map_err(|e| BuildError::Elf(format!("failed to read section {name}: {e:?}")))?;
            if compression.is_some() {
                return Err(BuildError::Elf(format!("section {name} is compressed")));
            }
            let virt_addr = shdr.sh_addr as u32;
            let load_addr = lma_for(shdr.sh_addr, &load_segments).ok_or_else(|| {
                BuildError::Elf(format!(
                    "section {name} at 0x{virt_addr:08x} is not covered by any LOAD segment"
                ))
            })?;
            sections.push(Section {
                name,
                load_addr,
                virt_addr,
                data: data.to_vec(),
            });
        }
        sections.sort_by_key(|s| s.load_addr);

        let layout = read_layout_symbols(&file)?;

        Ok(LinkedBinary {
            sections,
            layout,
            entry: file.ehdr.e_entry as u32,
        })
    }
}

/// Map a virtual address to its load (storage) address via the containing
/// LOAD segment, the same translation objcopy applies when producing a raw
/// binary.
fn lma_for(vaddr: u64, load_segments: &[(u64, u64, u64)]) -> Option<u32> {
    load_segments
        .iter()
        .find(|(p_vaddr, _, p_memsz)| vaddr >= *p_vaddr && vaddr < p_vaddr + p_memsz)
        .map(|(p_vaddr, p_paddr, _)| (p_paddr + (vaddr - p_vaddr)) as u32)
}

fn read_layout_symbols(file: &ElfBytes<AnyEndian>) -> Result<LayoutSymbols> {
    let Some((symtab, strtab)) = file
        .symbol_table()
        .map_err(|e| BuildError::Elf(format!("failed to read symbol table: {e:?}")))?
    else {
        return Err(BuildError::Elf("ELF has no symbol table".to_string()));
    };

    let mut values = [None::<u32>; REQUIRED_SYMBOLS.len()];
    for sym in symtab.iter() {
        let Ok(name) = strtab.get(sym.st_name as usize) else {
            continue;
        };
        if let Some(slot) = REQUIRED_SYMBOLS.iter().position(|s| *s == name) {
            values[slot] = Some(sym.st_value as u32);
        }
    }
    let get = |slot: usize| {
        values[slot].ok_or_else(|| {
            BuildError::Elf(format!("missing linker symbol {}", REQUIRED_SYMBOLS[slot]))
        })
    };
    Ok(LayoutSymbols {
        data_lma: get(0)?,
        data_vma: get(1)?,
        data_size: get(2)?,
        bss_vma: get(3)?,
        bss_size: get(4)?,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Hand-assemble a minimal ELF32 executable: `.text` linked at the
    /// payload origin, `.data` loaded behind it and run from SRAM, plus the
    /// five layout symbols. Just enough structure for `from_elf`.
    pub(crate) fn tiny_elf(text_len: usize, data_len: usize) -> Vec<u8> {
        const EHSIZE: usize = 52;
        const PHENT: usize = 32;
        const SHENT: usize = 40;
        const SYMENT: usize = 16;

        let base = 0x6006_0300u32;
        let sram = 0x6100_0000u32;
        let template_lma = (base + text_len as u32).div_ceil(16) * 16;

        let phoff = EHSIZE;
        let text_off = phoff + 2 * PHENT;
        let data_off = text_off + text_len;
        let symtab_off = data_off + data_len;
        let symtab_len = (1 + REQUIRED_SYMBOLS.len()) * SYMENT;
        let strtab_off = symtab_off + symtab_len;

        let mut strtab = vec![0u8];
        let mut sym_names = Vec::new();
        for name in REQUIRED_SYMBOLS {
            sym_names.push(strtab.len() as u32);
            strtab.extend_from_slice(name.as_bytes());
            strtab.push(0);
        }

        let mut shstrtab = vec![0u8];
        let mut sh_names = Vec::new();
        for name in [".text", ".data", ".symtab", ".strtab", ".shstrtab"] {
            sh_names.push(shstrtab.len() as u32);
            shstrtab.extend_from_slice(name.as_bytes());
            shstrtab.push(0);
        }

        let shstrtab_off = strtab_off + strtab.len();
        let shoff = (shstrtab_off + shstrtab.len()).next_multiple_of(4);

        let mut out = Vec::new();
        out.extend_from_slice(&[0x7f, b'E', b'L', b'F', 1, 1, 1, 0]);
        out.extend_from_slice(&[0u8; 8]);
        out.extend_from_slice(&2u16.to_le_bytes()); // ET_EXEC
        out.extend_from_slice(&243u16.to_le_bytes()); // EM_RISCV
        out.extend_from_slice(&1u32.to_le_bytes());
        out.extend_from_slice(&base.to_le_bytes()); // e_entry
        out.extend_from_slice(&(phoff as u32).to_le_bytes());
        out.extend_from_slice(&(shoff as u32).to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&(EHSIZE as u16).to_le_bytes());
        out.extend_from_slice(&(PHENT as u16).to_le_bytes());
        out.extend_from_slice(&2u16.to_le_bytes());
        out.extend_from_slice(&(SHENT as u16).to_le_bytes());
        out.extend_from_slice(&6u16.to_le_bytes());
        out.extend_from_slice(&5u16.to_le_bytes()); // e_shstrndx

        // Two LOAD segments: XIP text, then .data loaded high and run low.
        for (off, vaddr, paddr, len, flags) in [
            (text_off, base, base, text_len, 5u32),
            (data_off, sram, template_lma, data_len, 6u32),
        ] {
            out.extend_from_slice(&1u32.to_le_bytes()); // PT_LOAD
            out.extend_from_slice(&(off as u32).to_le_bytes());
            out.extend_from_slice(&vaddr.to_le_bytes());
            out.extend_from_slice(&paddr.to_le_bytes());
            out.extend_from_slice(&(len as u32).to_le_bytes());
            out.extend_from_slice(&(len as u32).to_le_bytes());
            out.extend_from_slice(&flags.to_le_bytes());
            out.extend_from_slice(&4u32.to_le_bytes());
        }

        out.extend((0..text_len).map(|i| i as u8));
        out.resize(out.len() + data_len, 0xA5);

        // Null symbol, then the layout symbols as SHN_ABS values.
        let symbols = [
            (0u32, 0u32),
            (sym_names[0], template_lma),
            (sym_names[1], sram),
            (sym_names[2], data_len as u32),
            (sym_names[3], sram + data_len as u32),
            (sym_names[4], 64),
        ];
        for (name, value) in symbols {
            out.extend_from_slice(&name.to_le_bytes());
            out.extend_from_slice(&value.to_le_bytes());
            out.extend_from_slice(&0u32.to_le_bytes());
            out.extend_from_slice(&[0, 0]);
            out.extend_from_slice(&0xfff1u16.to_le_bytes()); // SHN_ABS
        }

        out.extend_from_slice(&strtab);
        out.extend_from_slice(&shstrtab);
        out.resize(shoff, 0);

        // Sections: null, .text, .data, .symtab, .strtab, .shstrtab.
        let sections: [(u32, u32, u32, u32, u32, u32, u32, u32); 6] = [
            (0, 0, 0, 0, 0, 0, 0, 0),
            (sh_names[0], 1, 0x6, base, text_off as u32, text_len as u32, 0, 0),
            (sh_names[1], 1, 0x3, sram, data_off as u32, data_len as u32, 0, 0),
            (
                sh_names[2],
                2,
                0,
                0,
                symtab_off as u32,
                symtab_len as u32,
                4,
                SYMENT as u32,
            ),
            (sh_names[3], 3, 0, 0, strtab_off as u32, strtab.len() as u32, 0, 0),
            (
                sh_names[4],
                3,
                0,
                0,
                shstrtab_off as u32,
                shstrtab.len() as u32,
                0,
                0,
            ),
        ];
        for (name, stype, flags, addr, off, size, link, entsize) in sections {
            out.extend_from_slice(&name.to_le_bytes());
            out.extend_from_slice(&stype.to_le_bytes());
            out.extend_from_slice(&flags.to_le_bytes());
            out.extend_from_slice(&addr.to_le_bytes());
            out.extend_from_slice(&off.to_le_bytes());
            out.extend_from_slice(&size.to_le_bytes());
            out.extend_from_slice(&link.to_le_bytes());
            out.extend_from_slice(&0u32.to_le_bytes());
            out.extend_from_slice(&4u32.to_le_bytes());
            out.extend_from_slice(&entsize.to_le_bytes());
        }
        out
    }

    #[test]
    fn from_elf_reads_sections_and_symbols() {
        let binary = LinkedBinary::from_elf(&tiny_elf(640, 16)).unwrap();
        assert_eq!(binary.entry, 0x6006_0300);
        assert_eq!(binary.sections.len(), 2);
        assert_eq!(binary.sections[0].name, ".text");
        assert!(binary.sections[0].is_xip());
        assert_eq!(binary.sections[0].data.len(), 640);
        assert_eq!(binary.sections[1].name, ".data");
        assert_eq!(binary.sections[1].load_addr, 0x6006_0580);
        assert_eq!(binary.sections[1].virt_addr, 0x6100_0000);
        assert_eq!(
            binary.layout,
            LayoutSymbols {
                data_lma: 0x6006_0580,
                data_vma: 0x6100_0000,
                data_size: 16,
                bss_vma: 0x6100_0010,
                bss_size: 64,
            }
        );
    }

    #[test]
    fn missing_layout_symbol_is_reported() {
        let mut bytes = tiny_elf(64, 16);
        let pos = bytes.windows(9).position(|w| w == b"_bss_size").unwrap();
        bytes[pos] = b'X';
        let err = LinkedBinary::from_elf(&bytes).unwrap_err();
        assert!(matches!(err, BuildError::Elf(msg) if msg.contains("_bss_size")));
    }

    #[test]
    fn lma_translation_follows_segments() {
        // One XIP segment and one .data segment loaded high, run low.
        let segments = [
            (0x6006_0300, 0x6006_0300, 0x290),
            (0x6100_0000, 0x6006_0590, 0x10),
        ];
        assert_eq!(lma_for(0x6006_0300, &segments), Some(0x6006_0300));
        assert_eq!(lma_for(0x6006_0400, &segments), Some(0x6006_0400));
        assert_eq!(lma_for(0x6100_0000, &segments), Some(0x6006_0590));
        assert_eq!(lma_for(0x6100_0008, &segments), Some(0x6006_0598));
        assert_eq!(lma_for(0x7000_0000, &segments), None);
    }
}
