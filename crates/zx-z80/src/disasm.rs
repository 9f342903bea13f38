//! Z80 disassembler covering the full opcode space, all four prefix layers.
//!
//! Used by debugger collaborators for disassembly views and by the
//! instruction tests to pin decode behaviour. Relative-jump operands are
//! shown as absolute targets, which needs the instruction's address.

/// One decoded instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disassembled {
    /// Mnemonic with operands, e.g. `LD IY,$1234`.
    pub text: String,
    /// Bytes consumed, 1-4.
    pub length: u16,
}

const R8: [&str; 8] = ["B", "C", "D", "E", "H", "L", "(HL)", "A"];
const RP: [&str; 4] = ["BC", "DE", "HL", "SP"];
const RP_AF: [&str; 4] = ["BC", "DE", "HL", "AF"];
const CC: [&str; 8] = ["NZ", "Z", "NC", "C", "PO", "PE", "P", "M"];
const ALU: [&str; 8] = [
    "ADD A,", "ADC A,", "SUB ", "SBC A,", "AND ", "XOR ", "OR ", "CP ",
];
const ROT: [&str; 8] = ["RLC", "RRC", "RL", "RR", "SLA", "SRA", "SLL", "SRL"];

/// Cursor over the instruction bytes. Reads past the end yield zero so a
/// truncated buffer still produces a stable decode.
struct Cursor<'a> {
    bytes: &'a [u8],
    pos: u16,
    addr: u16,
}

impl Cursor<'_> {
    fn byte(&mut self) -> u8 {
        let value = self.bytes.get(self.pos as usize).copied().unwrap_or(0);
        self.pos += 1;
        value
    }

    fn word(&mut self) -> u16 {
        let lo = self.byte();
        let hi = self.byte();
        u16::from(lo) | (u16::from(hi) << 8)
    }

    /// Absolute target of a relative jump whose displacement comes next.
    fn rel_target(&mut self) -> u16 {
        let d = self.byte() as i8;
        self.addr
            .wrapping_add(self.pos)
            .wrapping_add(d as u16)
    }
}

/// Signed displacement rendered the way assemblers write it: `+$05` / `-$05`.
fn disp(d: i8) -> String {
    if d < 0 {
        format!("-${:02X}", -(i16::from(d)))
    } else {
        format!("+${d:02X}")
    }
}

/// Disassemble the instruction at the start of `bytes`, assumed to sit at
/// `addr` (used only for relative-jump targets).
#[must_use]
pub fn disassemble(bytes: &[u8], addr: u16) -> Disassembled {
    let mut cur = Cursor {
        bytes,
        pos: 0,
        addr,
    };
    let text = instruction(&mut cur);
    Disassembled {
        text,
        length: cur.pos,
    }
}

fn instruction(cur: &mut Cursor<'_>) -> String {
    let op = cur.byte();
    match op {
        0xCB => cb(cur.byte(), None),
        0xED => ed(cur),
        0xDD => indexed(cur, "IX"),
        0xFD => indexed(cur, "IY"),
        _ => unprefixed(cur, op),
    }
}

fn unprefixed(cur: &mut Cursor<'_>, op: u8) -> String {
    let r = (op & 7) as usize;
    let r2 = ((op >> 3) & 7) as usize;
    let rp = ((op >> 4) & 3) as usize;
    let cc = ((op >> 3) & 7) as usize;

    match op {
        0x00 => "NOP".into(),
        0x01 | 0x11 | 0x21 | 0x31 => format!("LD {},${:04X}", RP[rp], cur.word()),
        0x02 => "LD (BC),A".into(),
        0x03 | 0x13 | 0x23 | 0x33 => format!("INC {}", RP[rp]),
        0x04 | 0x0C | 0x14 | 0x1C | 0x24 | 0x2C | 0x34 | 0x3C => format!("INC {}", R8[r2]),
        0x05 | 0x0D | 0x15 | 0x1D | 0x25 | 0x2D | 0x35 | 0x3D => format!("DEC {}", R8[r2]),
        0x06 | 0x0E | 0x16 | 0x1E | 0x26 | 0x2E | 0x36 | 0x3E => {
            format!("LD {},${:02X}", R8[r2], cur.byte())
        }
        0x07 => "RLCA".into(),
        0x08 => "EX AF,AF'".into(),
        0x09 | 0x19 | 0x29 | 0x39 => format!("ADD HL,{}", RP[rp]),
        0x0A => "LD A,(BC)".into(),
        0x0B | 0x1B | 0x2B | 0x3B => format!("DEC {}", RP[rp]),
        0x0F => "RRCA".into(),
        0x10 => format!("DJNZ ${:04X}", cur.rel_target()),
        0x12 => "LD (DE),A".into(),
        0x17 => "RLA".into(),
        0x18 => format!("JR ${:04X}", cur.rel_target()),
        0x1A => "LD A,(DE)".into(),
        0x1F => "RRA".into(),
        0x20 | 0x28 | 0x30 | 0x38 => {
            format!("JR {},${:04X}", CC[cc & 3], cur.rel_target())
        }
        0x22 => format!("LD (${:04X}),HL", cur.word()),
        0x27 => "DAA".into(),
        0x2A => format!("LD HL,(${:04X})", cur.word()),
        0x2F => "CPL".into(),
        0x32 => format!("LD (${:04X}),A", cur.word()),
        0x37 => "SCF".into(),
        0x3A => format!("LD A,(${:04X})", cur.word()),
        0x3F => "CCF".into(),
        0x76 => "HALT".into(),
        0x40..=0x7F => format!("LD {},{}", R8[r2], R8[r]),
        0x80..=0xBF => format!("{}{}", ALU[r2], R8[r]),
        0xC0 | 0xC8 | 0xD0 | 0xD8 | 0xE0 | 0xE8 | 0xF0 | 0xF8 => format!("RET {}", CC[cc]),
        0xC1 | 0xD1 | 0xE1 | 0xF1 => format!("POP {}", RP_AF[rp]),
        0xC2 | 0xCA | 0xD2 | 0xDA | 0xE2 | 0xEA | 0xF2 | 0xFA => {
            format!("JP {},${:04X}", CC[cc], cur.word())
        }
        0xC3 => format!("JP ${:04X}", cur.word()),
        0xC4 | 0xCC | 0xD4 | 0xDC | 0xE4 | 0xEC | 0xF4 | 0xFC => {
            format!("CALL {},${:04X}", CC[cc], cur.word())
        }
        0xC5 | 0xD5 | 0xE5 | 0xF5 => format!("PUSH {}", RP_AF[rp]),
        0xC6 | 0xCE | 0xD6 | 0xDE | 0xE6 | 0xEE | 0xF6 | 0xFE => {
            format!("{}${:02X}", ALU[cc], cur.byte())
        }
        0xC7 | 0xCF | 0xD7 | 0xDF | 0xE7 | 0xEF | 0xF7 | 0xFF => {
            format!("RST ${:02X}", op & 0x38)
        }
        0xC9 => "RET".into(),
        0xCD => format!("CALL ${:04X}", cur.word()),
        0xD3 => format!("OUT (${:02X}),A", cur.byte()),
        0xD9 => "EXX".into(),
        0xDB => format!("IN A,(${:02X})", cur.byte()),
        0xE3 => "EX (SP),HL".into(),
        0xE9 => "JP (HL)".into(),
        0xEB => "EX DE,HL".into(),
        0xF3 => "DI".into(),
        0xF9 => "LD SP,HL".into(),
        0xFB => "EI".into(),
        // The prefixes are handled by the caller
        0xCB | 0xDD | 0xED | 0xFD => unreachable!("prefix reached unprefixed decoder"),
    }
}

/// CB-prefixed opcode; `mem` overrides the (HL) operand for DD CB/FD CB.
fn cb(op: u8, mem: Option<&str>) -> String {
    let r = (op & 7) as usize;
    let bit = (op >> 3) & 7;
    let rot = ((op >> 3) & 7) as usize;
    let operand = mem.unwrap_or(R8[r]);

    // Undocumented DD CB forms with a register index copy the result:
    // "RLC (IX+d),B" style.
    let copy = match mem {
        Some(_) if r != 6 => format!(",{}", R8[r]),
        _ => String::new(),
    };

    match op >> 6 {
        0 => format!("{} {operand}{copy}", ROT[rot]),
        1 => format!("BIT {bit},{operand}"),
        2 => format!("RES {bit},{operand}{copy}"),
        _ => format!("SET {bit},{operand}{copy}"),
    }
}

fn ed(cur: &mut Cursor<'_>) -> String {
    let op = cur.byte();
    let r2 = ((op >> 3) & 7) as usize;
    let rp = ((op >> 4) & 3) as usize;

    match op {
        0x40 | 0x48 | 0x50 | 0x58 | 0x60 | 0x68 | 0x78 => format!("IN {},(C)", R8[r2]),
        0x70 => "IN (C)".into(),
        0x41 | 0x49 | 0x51 | 0x59 | 0x61 | 0x69 | 0x79 => format!("OUT (C),{}", R8[r2]),
        0x71 => "OUT (C),0".into(),
        0x42 | 0x52 | 0x62 | 0x72 => format!("SBC HL,{}", RP[rp]),
        0x4A | 0x5A | 0x6A | 0x7A => format!("ADC HL,{}", RP[rp]),
        0x43 | 0x53 | 0x63 | 0x73 => format!("LD (${:04X}),{}", cur.word(), RP[rp]),
        0x4B | 0x5B | 0x6B | 0x7B => format!("LD {},(${:04X})", RP[rp], cur.word()),
        0x44 | 0x4C | 0x54 | 0x5C | 0x64 | 0x6C | 0x74 | 0x7C => "NEG".into(),
        0x4D => "RETI".into(),
        0x45 | 0x55 | 0x5D | 0x65 | 0x6D | 0x75 | 0x7D => "RETN".into(),
        0x46 | 0x4E | 0x66 | 0x6E => "IM 0".into(),
        0x56 | 0x76 => "IM 1".into(),
        0x5E | 0x7E => "IM 2".into(),
        0x47 => "LD I,A".into(),
        0x4F => "LD R,A".into(),
        0x57 => "LD A,I".into(),
        0x5F => "LD A,R".into(),
        0x67 => "RRD".into(),
        0x6F => "RLD".into(),
        0xA0 => "LDI".into(),
        0xA1 => "CPI".into(),
        0xA2 => "INI".into(),
        0xA3 => "OUTI".into(),
        0xA8 => "LDD".into(),
        0xA9 => "CPD".into(),
        0xAA => "IND".into(),
        0xAB => "OUTD".into(),
        0xB0 => "LDIR".into(),
        0xB1 => "CPIR".into(),
        0xB2 => "INIR".into(),
        0xB3 => "OTIR".into(),
        0xB8 => "LDDR".into(),
        0xB9 => "CPDR".into(),
        0xBA => "INDR".into(),
        0xBB => "OTDR".into(),
        _ => "NOP*".into(), // unassigned ED opcode, executes as NOP
    }
}

fn indexed(cur: &mut Cursor<'_>, ix: &str) -> String {
    let op = cur.byte();
    let r = (op & 7) as usize;
    let r2 = ((op >> 3) & 7) as usize;
    let rp = ((op >> 4) & 3) as usize;

    // H/L become IXH/IXL except in the (IX+d) forms.
    let half = |i: usize| -> String {
        match i {
            4 => format!("{ix}H"),
            5 => format!("{ix}L"),
            _ => R8[i].into(),
        }
    };

    match op {
        0x09 | 0x19 | 0x29 | 0x39 => {
            let rr = if rp == 2 { ix } else { RP[rp] };
            format!("ADD {ix},{rr}")
        }
        0x21 => format!("LD {ix},${:04X}", cur.word()),
        0x22 => format!("LD (${:04X}),{ix}", cur.word()),
        0x23 => format!("INC {ix}"),
        0x2B => format!("DEC {ix}"),
        0x24 | 0x2C => format!("INC {}", half(r2)),
        0x25 | 0x2D => format!("DEC {}", half(r2)),
        0x26 | 0x2E => format!("LD {},${:02X}", half(r2), cur.byte()),
        0x2A => format!("LD {ix},(${:04X})", cur.word()),
        0x34 => format!("INC ({ix}{})", disp(cur.byte() as i8)),
        0x35 => format!("DEC ({ix}{})", disp(cur.byte() as i8)),
        0x36 => {
            let d = cur.byte() as i8;
            format!("LD ({ix}{}),${:02X}", disp(d), cur.byte())
        }
        0x76 => "HALT".into(),
        0x40..=0x7F if r == 6 => {
            format!("LD {},({ix}{})", R8[r2], disp(cur.byte() as i8))
        }
        0x40..=0x7F if r2 == 6 => {
            format!("LD ({ix}{}),{}", disp(cur.byte() as i8), R8[r])
        }
        0x40..=0x7F => format!("LD {},{}", half(r2), half(r)),
        0x80..=0xBF if r == 6 => {
            format!("{}({ix}{})", ALU[r2], disp(cur.byte() as i8))
        }
        0x80..=0xBF => format!("{}{}", ALU[r2], half(r)),
        0xCB => {
            let d = cur.byte() as i8;
            let sub = cur.byte();
            let operand = format!("({ix}{})", disp(d));
            cb(sub, Some(&operand))
        }
        0xE1 => format!("POP {ix}"),
        0xE3 => format!("EX (SP),{ix}"),
        0xE5 => format!("PUSH {ix}"),
        0xE9 => format!("JP ({ix})"),
        0xF9 => format!("LD SP,{ix}"),
        // Chained prefixes: the last one wins
        0xDD => indexed(cur, "IX"),
        0xFD => indexed(cur, "IY"),
        0xED => ed(cur),
        // No indexed meaning: the prefix is inert
        _ => unprefixed(cur, op),
    }
}
