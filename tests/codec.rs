mod support;

use pretty_assertions::assert_eq;

use jvm_remap::{
    class::{Attribute, Constant, Operand},
    error::ClassReadError,
    parse, serialize,
};

const FIXTURE: &str = "
class public super demo/Counter extends java/lang/Object implements java/lang/Runnable
source Counter.java
field private count I
field public static NAME Ljava/lang/String;
method public <init> ()V
  aload_0
  invokespecial java/lang/Object <init> ()V
  return
end
method public run ()V
  aload_0
  dup
  getfield demo/Counter count I
  iconst_1
  iadd
  putfield demo/Counter count I
  ldc \"tick\"
  putstatic demo/Counter NAME Ljava/lang/String;
  ldc class demo/Counter
  pop
  return
end
method public static make ()Ldemo/Counter;
  new demo/Counter
  dup
  invokespecial demo/Counter <init> ()V
  areturn
end
";

#[test]
fn parse_of_serialize_is_stable() {
    let bytes = support::assemble(FIXTURE);
    let model = parse(&bytes).unwrap();
    let rewritten = serialize(&model).unwrap();
    assert_eq!(parse(&rewritten).unwrap(), model);
    assert_eq!(serialize(&parse(&rewritten).unwrap()).unwrap(), rewritten);
}

#[test]
fn model_exposes_symbolic_references() {
    let model = parse(&support::assemble(FIXTURE)).unwrap();
    assert_eq!(model.name.as_ref(), "demo/Counter");
    assert_eq!(model.interfaces[0].as_ref(), "java/lang/Runnable");
    assert_eq!(model.source_file(), Some("Counter.java"));
    let run = model.find_method("run", "()V").unwrap();
    let operands: Vec<&Operand> = run.code().unwrap().instructions.iter().map(|i| &i.operand).collect();
    assert_eq!(operands[6], &Operand::Constant(Constant::String("tick".into())));
    assert_eq!(operands[8], &Operand::Constant(Constant::Class("demo/Counter".into())));
    assert!(matches!(model.attributes[0], Attribute::SourceFile(_)));
}

#[test]
fn disassembly_matches_the_fixture() {
    let text = support::disassemble(&support::assemble(FIXTURE));
    assert!(text.starts_with("class demo/Counter extends java/lang/Object implements java/lang/Runnable\n"));
    assert!(text.contains("  getfield demo/Counter count I\n"));
    assert!(text.contains("  ldc \"tick\"\n"));
    assert!(text.contains("  invokespecial demo/Counter <init> ()V\n"));
}

#[test]
fn truncated_input_is_malformed() {
    let bytes = support::assemble(FIXTURE);
    for cut in [0, 4, 9, bytes.len() / 2, bytes.len() - 1] {
        assert!(parse(&bytes[..cut]).is_err(), "accepted {cut} bytes");
    }
}

#[test]
fn bad_magic_and_trailing_bytes() {
    let mut bytes = support::assemble(FIXTURE);
    bytes.push(0);
    assert!(matches!(parse(&bytes), Err(ClassReadError::TrailingBytes(1))));
    bytes.pop();
    bytes[0] = 0;
    assert!(matches!(parse(&bytes), Err(ClassReadError::InvalidMagic(_))));
}
