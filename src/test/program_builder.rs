use crate::prog::{
    BufId, Instruction, MAX_FLOW_VARS, Mode, ProgramBuilder, ProgramError, Side, VarId,
};

#[test]
fn request_response_program_has_send_then_recv() {
    let req = b"GET / HTTP/1.1\r\n\r\n";
    let resp = b"HTTP/1.1 200 OK\r\n\r\nhello";

    let mut b = ProgramBuilder::new(Side::Client);
    b.send(req).expect("send");
    b.recv(resp.len() as u64).expect("recv");
    let prog = b.finalize().expect("finalize");

    assert_eq!(
        prog.instructions(),
        &[
            Instruction::Send {
                buf_index: BufId(0)
            },
            Instruction::Recv {
                min_bytes: resp.len() as u64,
                partial: false
            },
        ]
    );
    assert_eq!(prog.tx_bytes(), req.len() as u64);
    assert_eq!(prog.rx_watermark(), resp.len() as u64);
}

#[test]
fn counted_loop_jump_lands_after_its_label() {
    let mut b = ProgramBuilder::new(Side::Client);
    b.set_var("i", 5).expect("set_var");
    b.set_label("a:").expect("set_label");
    b.send(b"x").expect("send");
    b.jmp_nz("i", "a:").expect("jmp_nz");
    let prog = b.finalize().expect("finalize");

    assert_eq!(prog.len(), 4);
    assert!(matches!(
        prog.instructions()[0],
        Instruction::SetVar {
            id: VarId(0),
            val: 5
        }
    ));
    assert!(matches!(prog.instructions()[1], Instruction::SetLabel { .. }));
    assert!(matches!(prog.instructions()[2], Instruction::Send { .. }));
    // jump target is the instruction following the label
    assert!(prog.instructions()[3].is_jump());
    assert_eq!(
        prog.instructions()[3],
        Instruction::JmpNz {
            id: VarId(0),
            offset: 2
        }
    );
}

#[test]
fn send_blocking_toggles_bracket_the_sends_in_program_order() {
    let mut b = ProgramBuilder::new(Side::Client);
    b.set_send_blocking(false);
    b.send(b"one").expect("send");
    b.send(b"two").expect("send");
    b.set_send_blocking(true);
    let prog = b.finalize().expect("finalize");

    assert_eq!(
        prog.instructions()[0],
        Instruction::SetSendBlocking { blocking: false }
    );
    assert!(matches!(prog.instructions()[1], Instruction::Send { .. }));
    assert!(matches!(prog.instructions()[2], Instruction::Send { .. }));
    assert_eq!(
        prog.instructions()[3],
        Instruction::SetSendBlocking { blocking: true }
    );
}

#[test]
fn forward_jump_reference_resolves_at_finalize() {
    let mut b = ProgramBuilder::new(Side::Client);
    b.set_var("n", 2).expect("set_var");
    b.jmp_nz("n", "end:").expect("jump before label is fine");
    b.send(b"skipped on last pass").expect("send");
    b.set_label("end:").expect("set_label");
    let prog = b.finalize().expect("finalize");

    assert_eq!(
        prog.instructions()[1],
        Instruction::JmpNz {
            id: VarId(0),
            offset: 4
        }
    );
}

#[test]
fn undefined_jump_target_fails_at_finalize() {
    let mut b = ProgramBuilder::new(Side::Client);
    b.set_var("n", 3).expect("set_var");
    b.jmp_nz("n", "nowhere:").expect("append is fine");
    let err = b.finalize().expect_err("must fail");
    assert_eq!(err, ProgramError::UndefinedLabel("nowhere:".to_string()));
}

#[test]
fn duplicate_label_fails_immediately() {
    let mut b = ProgramBuilder::new(Side::Client);
    b.set_label("a:").expect("first");
    let err = b.set_label("a:").expect_err("second must fail");
    assert_eq!(err, ProgramError::DuplicateLabel("a:".to_string()));
}

#[test]
fn jump_on_unknown_variable_fails_immediately() {
    let mut b = ProgramBuilder::new(Side::Client);
    b.set_label("a:").expect("set_label");
    let err = b.jmp_nz("ghost", "a:").expect_err("must fail");
    assert_eq!(err, ProgramError::UnknownVar("ghost".to_string()));
}

#[test]
fn variable_kinds_are_fixed_at_creation() {
    let mut b = ProgramBuilder::new(Side::Client);
    b.set_var("n", 1).expect("counter");
    b.set_tick_var("t0").expect("tick");
    b.set_label("a:").expect("set_label");

    assert_eq!(
        b.jmp_dp("n", "a:", 1000).expect_err("counter is not a tick"),
        ProgramError::NotATickVar("n".to_string())
    );
    assert_eq!(
        b.jmp_nz("t0", "a:").expect_err("tick is not a counter"),
        ProgramError::NotACounter("t0".to_string())
    );
    assert_eq!(
        b.set_var("t0", 7).expect_err("cannot overwrite a tick var"),
        ProgramError::NotATickVar("t0".to_string())
    );
}

#[test]
fn variable_count_is_bounded() {
    let mut b = ProgramBuilder::new(Side::Client);
    for i in 0..MAX_FLOW_VARS {
        b.set_var(&format!("v{i}"), 1).expect("within bound");
    }
    let err = b.set_var("one_too_many", 1).expect_err("must fail");
    assert_eq!(err, ProgramError::TooManyVars);
}

#[test]
fn overwriting_an_existing_counter_reuses_its_register() {
    let mut b = ProgramBuilder::new(Side::Client);
    b.set_var("n", 1).expect("first");
    b.set_var("n", 9).expect("overwrite");
    let prog = b.finalize().expect("finalize");
    assert_eq!(prog.num_vars(), 1);
    assert_eq!(
        prog.instructions()[1],
        Instruction::SetVar {
            id: VarId(0),
            val: 9
        }
    );
}

#[test]
fn lifecycle_ops_are_side_restricted() {
    let mut b = ProgramBuilder::new(Side::Server);
    assert_eq!(
        b.connect().expect_err("server cannot connect"),
        ProgramError::SideRestricted {
            op: "connect",
            side: Side::Server
        }
    );
    b.accept().expect("server accepts");

    let mut b = ProgramBuilder::new(Side::Client);
    assert_eq!(
        b.accept().expect_err("client cannot accept"),
        ProgramError::SideRestricted {
            op: "accept",
            side: Side::Client
        }
    );
    b.connect().expect("client connects");
}

#[test]
fn identical_payloads_share_one_buffer_slot() {
    let mut b = ProgramBuilder::new(Side::Client);
    b.send(b"aaa").expect("send");
    b.send(b"bbb").expect("send");
    b.send(b"aaa").expect("send");
    let prog = b.finalize().expect("finalize");

    assert_eq!(prog.buffers().len(), 2);
    assert_eq!(
        prog.instructions()[0],
        Instruction::Send {
            buf_index: BufId(0)
        }
    );
    assert_eq!(
        prog.instructions()[2],
        Instruction::Send {
            buf_index: BufId(0)
        }
    );
    assert_eq!(prog.tx_bytes(), 9);
}

#[test]
fn recv_watermark_accumulates_across_recv_calls() {
    let mut b = ProgramBuilder::new(Side::Server);
    b.recv(100).expect("recv");
    b.recv(200).expect("recv");
    b.recv_partial(50).expect("recv_partial");
    let prog = b.finalize().expect("finalize");

    assert_eq!(
        prog.instructions(),
        &[
            Instruction::Recv {
                min_bytes: 100,
                partial: false
            },
            Instruction::Recv {
                min_bytes: 300,
                partial: false
            },
            Instruction::Recv {
                min_bytes: 350,
                partial: true
            },
        ]
    );
    assert_eq!(prog.rx_watermark(), 350);
}

#[test]
fn empty_payload_and_zero_recv_are_rejected() {
    let mut b = ProgramBuilder::new(Side::Client);
    assert_eq!(b.send(b"").expect_err("empty"), ProgramError::EmptyBuffer);
    assert_eq!(b.recv(0).expect_err("zero"), ProgramError::ZeroRecvBytes);
    assert_eq!(
        b.delay_rand(10, 5).expect_err("inverted range"),
        ProgramError::BadDelayRange
    );
}

#[test]
fn building_twice_yields_identical_programs() {
    let build = || {
        let mut b = ProgramBuilder::new(Side::Client);
        b.send(b"req").expect("send");
        b.set_var("i", 4).expect("set_var");
        b.set_label("l:").expect("set_label");
        b.recv_partial(400).expect("recv");
        b.jmp_nz("i", "l:").expect("jmp");
        b.delay(250);
        b.finalize().expect("finalize")
    };
    assert_eq!(build(), build());
}

#[test]
fn message_mode_is_carried_into_the_program() {
    let b = ProgramBuilder::with_mode(Side::Client, Mode::Message);
    let prog = b.finalize().expect("finalize");
    assert_eq!(prog.mode(), Mode::Message);
    assert!(prog.is_empty());
    assert_eq!(ProgramBuilder::new(Side::Client).mode(), Mode::Stream);
}
