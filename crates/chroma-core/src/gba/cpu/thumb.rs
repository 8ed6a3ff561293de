use super::{
    add_with_carry, multiply_cycles, shift_imm, shift_reg, Arm7, ShiftKind, LR, PC, SP,
};
use crate::gba::bus::{Access, AgbBus};

/// Decode and run one 16-bit instruction. Thumb has no per-instruction
/// condition field; only the conditional branch encodes one.
pub fn execute(cpu: &mut Arm7, bus: &mut AgbBus, op: u16) {
    let op = op as u32;
    match op >> 12 {
        0x0 | 0x1 => {
            if op & 0x1800 == 0x1800 {
                add_subtract(cpu, op);
            } else {
                move_shifted(cpu, op);
            }
        }
        0x2 | 0x3 => immediate_op(cpu, op),
        0x4 => {
            if op & 0x0C00 == 0x0000 {
                alu_op(cpu, bus, op);
            } else if op & 0x0C00 == 0x0400 {
                hi_register_op(cpu, op);
            } else {
                // PC-relative load; the pipeline address is word-aligned.
                let rd = ((op >> 8) & 0x7) as usize;
                let addr = (cpu.reg(PC) & !3).wrapping_add((op & 0xFF) << 2);
                let value = bus.read32_rotated(addr, Access::NonSeq);
                bus.internal(1);
                cpu.regs[rd] = value;
            }
        }
        0x5 => {
            if op & 0x0200 == 0 {
                load_store_reg_offset(cpu, bus, op);
            } else {
                load_store_sign_extended(cpu, bus, op);
            }
        }
        0x6 | 0x7 => load_store_imm_offset(cpu, bus, op),
        0x8 => load_store_halfword(cpu, bus, op),
        0x9 => load_store_sp_relative(cpu, bus, op),
        0xA => {
            // Load address: PC (word-aligned) or SP plus an immediate.
            let rd = ((op >> 8) & 0x7) as usize;
            let offset = (op & 0xFF) << 2;
            cpu.regs[rd] = if op & 0x0800 != 0 {
                cpu.regs[SP].wrapping_add(offset)
            } else {
                (cpu.reg(PC) & !3).wrapping_add(offset)
            };
        }
        0xB => {
            if op & 0x0F00 == 0x0000 {
                let offset = (op & 0x7F) << 2;
                if op & 0x80 != 0 {
                    cpu.regs[SP] = cpu.regs[SP].wrapping_sub(offset);
                } else {
                    cpu.regs[SP] = cpu.regs[SP].wrapping_add(offset);
                }
            } else if op & 0x0600 == 0x0400 {
                push_pop(cpu, bus, op);
            } else {
                log::warn!(target: "chroma_core::gba", "undefined thumb opcode {op:#06X}");
                cpu.take_undefined();
            }
        }
        0xC => multiple_load_store(cpu, bus, op),
        0xD => {
            let cond = (op >> 8) & 0xF;
            if cond == 0xF {
                cpu.take_swi();
            } else if cpu.cpsr.passes(cond) {
                let offset = (op as u8 as i8 as i32) << 1;
                let target = cpu.reg(PC).wrapping_add(offset as u32);
                cpu.write_pc(target);
            }
        }
        0xE => {
            let offset = ((op & 0x7FF) << 21) as i32 >> 20;
            let target = cpu.reg(PC).wrapping_add(offset as u32);
            cpu.write_pc(target);
        }
        _ => branch_link(cpu, op),
    }
}

fn move_shifted(cpu: &mut Arm7, op: u32) {
    let kind = ShiftKind::from_bits(op >> 11);
    let amount = (op >> 6) & 0x1F;
    let rs = ((op >> 3) & 0x7) as usize;
    let rd = (op & 0x7) as usize;

    let (result, carry) = shift_imm(kind, cpu.regs[rs], amount, cpu.cpsr.carry());
    cpu.regs[rd] = result;
    cpu.cpsr.set_nz(result);
    cpu.cpsr.set_carry(carry);
}

fn add_subtract(cpu: &mut Arm7, op: u32) {
    let rn = ((op >> 6) & 0x7) as usize;
    let rs = ((op >> 3) & 0x7) as usize;
    let rd = (op & 0x7) as usize;
    let operand = if op & 0x0400 != 0 {
        rn as u32
    } else {
        cpu.regs[rn]
    };

    let (result, carry, overflow) = if op & 0x0200 != 0 {
        add_with_carry(cpu.regs[rs], !operand, true)
    } else {
        add_with_carry(cpu.regs[rs], operand, false)
    };
    cpu.regs[rd] = result;
    cpu.cpsr.set_nz(result);
    cpu.cpsr.set_carry(carry);
    cpu.cpsr.set_overflow(overflow);
}

fn immediate_op(cpu: &mut Arm7, op: u32) {
    let rd = ((op >> 8) & 0x7) as usize;
    let imm = op & 0xFF;
    match (op >> 11) & 0x3 {
        0 => {
            // MOV
            cpu.regs[rd] = imm;
            cpu.cpsr.set_nz(imm);
        }
        1 => {
            // CMP
            let (result, carry, overflow) = add_with_carry(cpu.regs[rd], !imm, true);
            cpu.cpsr.set_nz(result);
            cpu.cpsr.set_carry(carry);
            cpu.cpsr.set_overflow(overflow);
        }
        2 => {
            // ADD
            let (result, carry, overflow) = add_with_carry(cpu.regs[rd], imm, false);
            cpu.regs[rd] = result;
            cpu.cpsr.set_nz(result);
            cpu.cpsr.set_carry(carry);
            cpu.cpsr.set_overflow(overflow);
        }
        _ => {
            // SUB
            let (result, carry, overflow) = add_with_carry(cpu.regs[rd], !imm, true);
            cpu.regs[rd] = result;
            cpu.cpsr.set_nz(result);
            cpu.cpsr.set_carry(carry);
            cpu.cpsr.set_overflow(overflow);
        }
    }
}

fn alu_op(cpu: &mut Arm7, bus: &mut AgbBus, op: u32) {
    let rs = ((op >> 3) & 0x7) as usize;
    let rd = (op & 0x7) as usize;
    let lhs = cpu.regs[rd];
    let rhs = cpu.regs[rs];
    let carry_in = cpu.cpsr.carry();

    let mut write = true;
    let mut arith = false;
    let (result, carry, overflow) = match (op >> 6) & 0xF {
        0x0 => (lhs & rhs, carry_in, false),
        0x1 => (lhs ^ rhs, carry_in, false),
        0x2 => {
            bus.internal(1);
            let (r, c) = shift_reg(ShiftKind::Lsl, lhs, rhs & 0xFF, carry_in);
            (r, c, false)
        }
        0x3 => {
            bus.internal(1);
            let (r, c) = shift_reg(ShiftKind::Lsr, lhs, rhs & 0xFF, carry_in);
            (r, c, false)
        }
        0x4 => {
            bus.internal(1);
            let (r, c) = shift_reg(ShiftKind::Asr, lhs, rhs & 0xFF, carry_in);
            (r, c, false)
        }
        0x5 => {
            arith = true;
            add_with_carry(lhs, rhs, carry_in)
        }
        0x6 => {
            arith = true;
            add_with_carry(lhs, !rhs, carry_in)
        }
        0x7 => {
            bus.internal(1);
            let (r, c) = shift_reg(ShiftKind::Ror, lhs, rhs & 0xFF, carry_in);
            (r, c, false)
        }
        0x8 => {
            write = false;
            (lhs & rhs, carry_in, false)
        }
        0x9 => {
            arith = true;
            add_with_carry(0, !rhs, true)
        }
        0xA => {
            write = false;
            arith = true;
            add_with_carry(lhs, !rhs, true)
        }
        0xB => {
            write = false;
            arith = true;
            add_with_carry(lhs, rhs, false)
        }
        0xC => (lhs | rhs, carry_in, false),
        0xD => {
            bus.internal(multiply_cycles(lhs, true));
            (lhs.wrapping_mul(rhs), carry_in, false)
        }
        0xE => (lhs & !rhs, carry_in, false),
        _ => (!rhs, carry_in, false),
    };

    cpu.cpsr.set_nz(result);
    cpu.cpsr.set_carry(carry);
    if arith {
        cpu.cpsr.set_overflow(overflow);
    }
    if write {
        cpu.regs[rd] = result;
    }
}

fn hi_register_op(cpu: &mut Arm7, op: u32) {
    let rd = ((op & 0x7) | ((op >> 4) & 0x8)) as usize;
    let rs = ((op >> 3) & 0xF) as usize;
    let rhs = cpu.reg(rs);

    match (op >> 8) & 0x3 {
        0 => {
            // ADD without flags
            let result = cpu.reg(rd).wrapping_add(rhs);
            if rd == PC {
                cpu.write_pc(result);
            } else {
                cpu.regs[rd] = result;
            }
        }
        1 => {
            let (result, carry, overflow) = add_with_carry(cpu.reg(rd), !rhs, true);
            cpu.cpsr.set_nz(result);
            cpu.cpsr.set_carry(carry);
            cpu.cpsr.set_overflow(overflow);
        }
        2 => {
            if rd == PC {
                cpu.write_pc(rhs);
            } else {
                cpu.regs[rd] = rhs;
            }
        }
        _ => cpu.write_pc_exchange(rhs),
    }
}

fn load_store_reg_offset(cpu: &mut Arm7, bus: &mut AgbBus, op: u32) {
    let ro = ((op >> 6) & 0x7) as usize;
    let rb = ((op >> 3) & 0x7) as usize;
    let rd = (op & 0x7) as usize;
    let addr = cpu.regs[rb].wrapping_add(cpu.regs[ro]);

    match (op >> 10) & 0x3 {
        0 => bus.write32(addr, cpu.regs[rd], Access::NonSeq),
        1 => bus.write8(addr, cpu.regs[rd] as u8, Access::NonSeq),
        2 => {
            cpu.regs[rd] = bus.read32_rotated(addr, Access::NonSeq);
            bus.internal(1);
        }
        _ => {
            cpu.regs[rd] = bus.read8(addr, Access::NonSeq) as u32;
            bus.internal(1);
        }
    }
}

fn load_store_sign_extended(cpu: &mut Arm7, bus: &mut AgbBus, op: u32) {
    let ro = ((op >> 6) & 0x7) as usize;
    let rb = ((op >> 3) & 0x7) as usize;
    let rd = (op & 0x7) as usize;
    let addr = cpu.regs[rb].wrapping_add(cpu.regs[ro]);

    match (op >> 10) & 0x3 {
        0 => bus.write16(addr, cpu.regs[rd] as u16, Access::NonSeq),
        1 => {
            cpu.regs[rd] = bus.read8(addr, Access::NonSeq) as i8 as i32 as u32;
            bus.internal(1);
        }
        2 => {
            cpu.regs[rd] = bus.read16_rotated(addr, Access::NonSeq);
            bus.internal(1);
        }
        _ => {
            cpu.regs[rd] = if addr & 1 != 0 {
                bus.read8(addr, Access::NonSeq) as i8 as i32 as u32
            } else {
                bus.read16(addr, Access::NonSeq) as i16 as i32 as u32
            };
            bus.internal(1);
        }
    }
}

fn load_store_imm_offset(cpu: &mut Arm7, bus: &mut AgbBus, op: u32) {
    let rb = ((op >> 3) & 0x7) as usize;
    let rd = (op & 0x7) as usize;
    let byte = op & 0x1000 != 0;
    let load = op & 0x0800 != 0;
    let offset = (op >> 6) & 0x1F;
    let addr = cpu.regs[rb].wrapping_add(if byte { offset } else { offset << 2 });

    match (load, byte) {
        (false, false) => bus.write32(addr, cpu.regs[rd], Access::NonSeq),
        (false, true) => bus.write8(addr, cpu.regs[rd] as u8, Access::NonSeq),
        (true, false) => {
            cpu.regs[rd] = bus.read32_rotated(addr, Access::NonSeq);
            bus.internal(1);
        }
        (true, true) => {
            cpu.regs[rd] = bus.read8(addr, Access::NonSeq) as u32;
            bus.internal(1);
        }
    }
}

fn load_store_halfword(cpu: &mut Arm7, bus: &mut AgbBus, op: u32) {
    let rb = ((op >> 3) & 0x7) as usize;
    let rd = (op & 0x7) as usize;
    let offset = ((op >> 6) & 0x1F) << 1;
    let addr = cpu.regs[rb].wrapping_add(offset);

    if op & 0x0800 != 0 {
        cpu.regs[rd] = bus.read16_rotated(addr, Access::NonSeq);
        bus.internal(1);
    } else {
        bus.write16(addr, cpu.regs[rd] as u16, Access::NonSeq);
    }
}

fn load_store_sp_relative(cpu: &mut Arm7, bus: &mut AgbBus, op: u32) {
    let rd = ((op >> 8) & 0x7) as usize;
    let addr = cpu.regs[SP].wrapping_add((op & 0xFF) << 2);

    if op & 0x0800 != 0 {
        cpu.regs[rd] = bus.read32_rotated(addr, Access::NonSeq);
        bus.internal(1);
    } else {
        bus.write32(addr, cpu.regs[rd], Access::NonSeq);
    }
}

fn push_pop(cpu: &mut Arm7, bus: &mut AgbBus, op: u32) {
    let pop = op & 0x0800 != 0;
    let with_link = op & 0x0100 != 0;
    let rlist = op & 0xFF;

    let mut access = Access::NonSeq;
    if pop {
        let mut addr = cpu.regs[SP];
        for idx in 0..8usize {
            if rlist & (1 << idx) == 0 {
                continue;
            }
            cpu.regs[idx] = bus.read32(addr, access);
            addr = addr.wrapping_add(4);
            access = Access::Seq;
        }
        if with_link {
            let value = bus.read32(addr, access);
            addr = addr.wrapping_add(4);
            // POP {.., pc} does not exchange on ARMv4T.
            cpu.write_pc(value);
        }
        bus.internal(1);
        cpu.regs[SP] = addr;
    } else {
        let count = rlist.count_ones() + with_link as u32;
        let base = cpu.regs[SP].wrapping_sub(count * 4);
        let mut addr = base;
        for idx in 0..8usize {
            if rlist & (1 << idx) == 0 {
                continue;
            }
            bus.write32(addr, cpu.regs[idx], access);
            addr = addr.wrapping_add(4);
            access = Access::Seq;
        }
        if with_link {
            bus.write32(addr, cpu.regs[LR], access);
        }
        cpu.regs[SP] = base;
    }
}

fn multiple_load_store(cpu: &mut Arm7, bus: &mut AgbBus, op: u32) {
    let load = op & 0x0800 != 0;
    let rb = ((op >> 8) & 0x7) as usize;
    let rlist = op & 0xFF;

    // Empty list: PC transfers and the base moves a full 0x40.
    if rlist == 0 {
        if load {
            let value = bus.read32(cpu.regs[rb], Access::NonSeq);
            bus.internal(1);
            cpu.write_pc(value);
        } else {
            bus.write32(cpu.regs[rb], cpu.reg(PC).wrapping_add(2), Access::NonSeq);
        }
        cpu.regs[rb] = cpu.regs[rb].wrapping_add(0x40);
        return;
    }

    let base = cpu.regs[rb];
    let mut addr = base;
    let lowest = rlist.trailing_zeros() as usize;
    let final_base = base.wrapping_add(rlist.count_ones() * 4);
    let mut access = Access::NonSeq;

    for idx in 0..8usize {
        if rlist & (1 << idx) == 0 {
            continue;
        }
        if load {
            cpu.regs[idx] = bus.read32(addr, access);
        } else {
            // A stored base goes out pre-writeback only as the first entry.
            let value = if idx == rb && idx != lowest {
                final_base
            } else {
                cpu.regs[idx]
            };
            bus.write32(addr, value, access);
        }
        addr = addr.wrapping_add(4);
        access = Access::Seq;
    }

    if load {
        bus.internal(1);
        // A loaded base keeps the loaded value.
        if rlist & (1 << rb) == 0 {
            cpu.regs[rb] = final_base;
        }
    } else {
        cpu.regs[rb] = final_base;
    }
}

fn branch_link(cpu: &mut Arm7, op: u32) {
    if op & 0x0800 == 0 {
        // First half: high part of the target into LR.
        let offset = ((op & 0x7FF) << 21) as i32 >> 9; // sign-extend, << 12
        cpu.regs[LR] = cpu.reg(PC).wrapping_add(offset as u32);
    } else {
        // Second half: jump and leave the return address (with the Thumb
        // bit) in LR.
        let target = cpu.regs[LR].wrapping_add((op & 0x7FF) << 1);
        let ret = cpu.regs[PC] | 1;
        cpu.write_pc(target);
        cpu.regs[LR] = ret;
    }
}
