use chroma_core::gba::bus::{Access, AgbBus};
use chroma_core::gba::cpu::psr::{Mode, Psr};
use chroma_core::gba::cpu::{Arm7, PC, SP};

/// Place ARM code in IWRAM and point the CPU at it, System mode, flags
/// clear, interrupts masked.
fn setup(words: &[u32]) -> (Arm7, AgbBus) {
    let mut bus = AgbBus::new(vec![0; 0x4000], vec![0; 0x100]);
    let mut cpu = Arm7::new(true);
    for (i, word) in words.iter().enumerate() {
        bus.write32(0x0300_0000 + i as u32 * 4, *word, Access::NonSeq);
    }
    cpu.regs[PC] = 0x0300_0000;
    (cpu, bus)
}

fn run(cpu: &mut Arm7, bus: &mut AgbBus, steps: usize) {
    for _ in 0..steps {
        cpu.step(bus);
    }
}

#[test]
fn condition_codes_gate_execution() {
    let (mut cpu, mut bus) = setup(&[
        0xE3B0_0000, // MOVS r0, #0       (Z set)
        0x0281_1001, // ADDEQ r1, r1, #1  (runs)
        0x1282_2001, // ADDNE r2, r2, #1  (skipped)
    ]);
    run(&mut cpu, &mut bus, 3);
    assert_eq!(cpu.regs[1], 1);
    assert_eq!(cpu.regs[2], 0);
    assert!(cpu.cpsr.zero());
}

#[test]
fn adds_sets_overflow_and_sign() {
    let (mut cpu, mut bus) = setup(&[
        0xE3E0_0102, // MVN r0, #0x80000000  -> 0x7FFFFFFF
        0xE290_0001, // ADDS r0, r0, #1
    ]);
    run(&mut cpu, &mut bus, 2);
    assert_eq!(cpu.regs[0], 0x8000_0000);
    assert!(cpu.cpsr.overflow());
    assert!(cpu.cpsr.negative());
    assert!(!cpu.cpsr.carry());
    assert!(!cpu.cpsr.zero());
}

#[test]
fn subs_carry_means_no_borrow() {
    let (mut cpu, mut bus) = setup(&[
        0xE3A0_0005, // MOV r0, #5
        0xE250_0005, // SUBS r0, r0, #5
    ]);
    run(&mut cpu, &mut bus, 2);
    assert_eq!(cpu.regs[0], 0);
    assert!(cpu.cpsr.zero());
    assert!(cpu.cpsr.carry());
}

#[test]
fn multiply_and_long_multiply() {
    let (mut cpu, mut bus) = setup(&[
        0xE3A0_1006, // MOV r1, #6
        0xE3A0_2007, // MOV r2, #7
        0xE000_0291, // MUL r0, r1, r2
        0xE3E0_3000, // MVN r3, #0        -> 0xFFFFFFFF (-1)
        0xE0C5_4393, // SMULL r4, r5, r3, r3
    ]);
    run(&mut cpu, &mut bus, 5);
    assert_eq!(cpu.regs[0], 42);
    // (-1) * (-1) = 1 across the 64-bit pair.
    assert_eq!(cpu.regs[4], 1);
    assert_eq!(cpu.regs[5], 0);
}

#[test]
fn load_store_word_round_trip() {
    let (mut cpu, mut bus) = setup(&[
        0xE581_0000, // STR r0, [r1]
        0xE591_2000, // LDR r2, [r1]
    ]);
    cpu.regs[0] = 0x1234_5678;
    cpu.regs[1] = 0x0300_0100;
    run(&mut cpu, &mut bus, 2);
    assert_eq!(cpu.regs[2], 0x1234_5678);
    assert_eq!(bus.read32(0x0300_0100, Access::NonSeq), 0x1234_5678);
}

#[test]
fn post_index_writeback() {
    let (mut cpu, mut bus) = setup(&[
        0xE491_0004, // LDR r0, [r1], #4
    ]);
    bus.write32(0x0300_0200, 0xCAFE_F00D, Access::NonSeq);
    cpu.regs[1] = 0x0300_0200;
    run(&mut cpu, &mut bus, 1);
    assert_eq!(cpu.regs[0], 0xCAFE_F00D);
    assert_eq!(cpu.regs[1], 0x0300_0204);
}

#[test]
fn bx_switches_to_thumb_and_back() {
    let (mut cpu, mut bus) = setup(&[
        0xE3A0_0403, // MOV r0, #0x03000000
        0xE380_000D, // ORR r0, r0, #0x0D  (thumb target | 1)
        0xE12F_FF10, // BX r0
    ]);
    bus.write16(0x0300_000C, 0x2007, Access::NonSeq); // MOV r0, #7
    run(&mut cpu, &mut bus, 3);
    assert!(cpu.cpsr.thumb());
    assert_eq!(cpu.regs[PC], 0x0300_000C);
    run(&mut cpu, &mut bus, 1);
    assert_eq!(cpu.regs[0], 7);
}

#[test]
fn thumb_alu_and_hi_register_ops() {
    let (mut cpu, mut bus) = setup(&[]);
    cpu.cpsr.set_thumb(true);
    for (i, half) in [
        0x2005u16, // MOV r0, #5
        0x3003,    // ADD r0, #3
        0x0081,    // LSL r1, r0, #2
        0x4685,    // MOV sp, r0
    ]
    .iter()
    .enumerate()
    {
        bus.write16(0x0300_0000 + i as u32 * 2, *half, Access::NonSeq);
    }
    cpu.regs[PC] = 0x0300_0000;
    run(&mut cpu, &mut bus, 4);
    assert_eq!(cpu.regs[0], 8);
    assert_eq!(cpu.regs[1], 32);
    assert_eq!(cpu.regs[SP], 8);
}

#[test]
fn msr_and_mrs_flag_round_trip() {
    let (mut cpu, mut bus) = setup(&[
        0xE328_F20F, // MSR cpsr_f, #0xF0000000
        0xE10F_0000, // MRS r0, cpsr
    ]);
    run(&mut cpu, &mut bus, 2);
    assert!(cpu.cpsr.negative() && cpu.cpsr.zero() && cpu.cpsr.carry() && cpu.cpsr.overflow());
    assert_eq!(cpu.regs[0] & 0xF000_0000, 0xF000_0000);
    // Mode bits were untouched.
    assert_eq!(cpu.cpsr.mode(), Mode::System);
}

#[test]
fn swi_enters_supervisor_with_return_address() {
    let (mut cpu, mut bus) = setup(&[0xEF00_0000]); // SWI #0
    cpu.step(&mut bus);
    assert_eq!(cpu.cpsr.mode(), Mode::Supervisor);
    assert_eq!(cpu.regs[PC], 0x0000_0008);
    assert_eq!(cpu.regs[14], 0x0300_0004);
    assert!(cpu.cpsr.irq_disabled());
    assert_eq!(cpu.spsr().mode(), Mode::System);
}

#[test]
fn irq_taken_between_instructions() {
    let (mut cpu, mut bus) = setup(&[0xE1A0_0000]); // MOV r0, r0
    cpu.cpsr.set_irq_disabled(false);
    bus.ie_reg = 0x0001;
    bus.if_reg = 0x0001;
    bus.write16(0x0400_0208, 1, Access::NonSeq); // IME on

    cpu.step(&mut bus);
    assert_eq!(cpu.cpsr.mode(), Mode::Irq);
    assert!(cpu.cpsr.irq_disabled());
    // LR holds the unexecuted instruction's address + 4.
    assert_eq!(cpu.regs[14], 0x0300_0004);
}

#[test]
fn ldm_with_pc_and_s_bit_restores_cpsr_atomically() {
    // From Supervisor: LDMIA sp!, {r0, pc}^ with a Thumb-state SPSR.
    let (mut cpu, mut bus) = setup(&[0xE8FD_8001]);
    cpu.switch_mode(Mode::Supervisor);

    let mut spsr = Psr::new(Mode::System);
    spsr.set_thumb(true);
    spsr.set_irq_disabled(false);
    cpu.set_spsr(spsr);

    cpu.regs[SP] = 0x0300_0100;
    bus.write32(0x0300_0100, 0xDEAD_BEEF, Access::NonSeq);
    bus.write32(0x0300_0104, 0x0300_0021, Access::NonSeq); // target | thumb bit

    cpu.step(&mut bus);

    assert_eq!(cpu.regs[0], 0xDEAD_BEEF);
    // PC and CPSR moved together: Thumb state, low bit folded into
    // alignment, and the pre-exception mode back in place.
    assert!(cpu.cpsr.thumb());
    assert_eq!(cpu.regs[PC], 0x0300_0020);
    assert_eq!(cpu.cpsr.mode(), Mode::System);
    assert!(!cpu.cpsr.irq_disabled());

    // The stack pointer writeback landed in the Supervisor bank.
    cpu.switch_mode(Mode::Supervisor);
    assert_eq!(cpu.regs[SP], 0x0300_0108);
}

#[test]
fn stm_stores_user_bank_with_s_bit() {
    // From IRQ mode, STMIA r0, {r13}^ stores the User r13, not IRQ's.
    let (mut cpu, mut bus) = setup(&[0xE8C0_2000]);
    cpu.regs[SP] = 0x1111_1111; // System/User r13
    cpu.switch_mode(Mode::Irq);
    cpu.regs[SP] = 0x2222_2222; // IRQ r13
    cpu.regs[0] = 0x0300_0180;

    cpu.step(&mut bus);
    assert_eq!(bus.read32(0x0300_0180, Access::NonSeq), 0x1111_1111);
}

#[test]
fn shift_by_register_sees_pc_one_fetch_ahead() {
    // ADD r0, pc, r1 LSL r2 reads PC as instruction + 12.
    let (mut cpu, mut bus) = setup(&[0xE08F_0211]); // ADD r0, pc, r1, LSL r2
    cpu.regs[1] = 0;
    cpu.regs[2] = 0;
    cpu.step(&mut bus);
    assert_eq!(cpu.regs[0], 0x0300_000C);
}
