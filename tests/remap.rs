mod support;

use std::{
    fs::File,
    io::{self, Write},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::Duration,
};

use pretty_assertions::assert_eq;

use jvm_remap::{
    CancelToken, ClassInput, ClassModel, DiagnosticKind, FileOutcome, HierarchyResolver,
    RemapConfig, RemapError, RemapRun, RunReport,
    class::{
        Attribute,
        attributes::{Module, ModulePackage, ModuleProvides, ModuleRequires},
    },
    consts::ClassAccessFlag,
    hierarchy::{ClassPath, MemoryClassPath, classpath},
    parse, parse_mappings,
};

const OBJECT: &str = "
class public super java/lang/Object
method public <init> ()V
  return
end
method public toString ()Ljava/lang/String;
  aconst_null
  areturn
end
";

fn jdk() -> Arc<dyn ClassPath> {
    let mut object = support::assemble_model(OBJECT);
    object.super_class = None;
    let mut classpath = MemoryClassPath::new();
    classpath.insert("java/lang/Object", jvm_remap::serialize(&object).unwrap());
    Arc::new(classpath)
}

fn remap_with(
    fixtures: &[&str],
    mappings: &str,
    classpath: Arc<dyn ClassPath>,
) -> Result<RunReport, RemapError> {
    let inputs = fixtures
        .iter()
        .enumerate()
        .map(|(i, fixture)| ClassInput::new(format!("fixture{i}"), support::assemble(fixture)))
        .collect();
    let symbols = Arc::new(parse_mappings(mappings)?);
    RemapRun::new(RemapConfig::default(), symbols, classpath).run(inputs, &CancelToken::new())
}

fn outputs(report: &RunReport) -> Vec<String> {
    report.written().map(|(_, bytes)| support::disassemble(bytes)).collect()
}

const A: &str = "
class public super A extends java/lang/Object
method public run ()V
  new B
  dup
  invokespecial B <init> ()V
  invokevirtual B value ()I
  pop
  return
end
";

const B: &str = "
class public super B extends java/lang/Object
method public <init> ()V
  aload_0
  invokespecial java/lang/Object <init> ()V
  return
end
method public value ()I
  iconst_1
  ireturn
end
";

#[test]
fn two_class_scenario() {
    let report = remap_with(
        &[A, B],
        "class A AA\n\
         class B BB\n\
         method A.run ()V runAA\n\
         method B.value ()I valueBB\n",
        jdk(),
    )
    .unwrap();
    assert!(report.is_success(), "{report}");
    assert!(report.diagnostics.is_empty(), "{:?}", report.diagnostics);
    let names: Vec<&str> = report.written().map(|(name, _)| name).collect();
    assert_eq!(names, ["AA", "BB"]);
    assert_eq!(
        outputs(&report),
        [
            "class AA extends java/lang/Object\n\
             method runAA ()V\n  \
               new BB\n  \
               dup\n  \
               invokespecial BB <init> ()V\n  \
               invokevirtual BB valueBB ()I\n  \
               pop\n  \
               return\n\
             end\n",
            "class BB extends java/lang/Object\n\
             method <init> ()V\n  \
               aload_0\n  \
               invokespecial java/lang/Object <init> ()V\n  \
               return\n\
             end\n\
             method valueBB ()I\n  \
               iconst_1\n  \
               ireturn\n\
             end\n",
        ]
    );
}

#[test]
fn renames_propagate_to_overrides() {
    let base = "
class public super p/Base extends java/lang/Object
method public m ()V
  return
end
";
    let child = "
class public super p/Child extends p/Base
method public m ()V
  aload_0
  invokespecial p/Base m ()V
  return
end
";
    let grandchild = "
class public super q/Grandchild extends p/Child
method public m ()V
  return
end
method public call ()V
  aload_0
  invokevirtual q/Grandchild m ()V
  return
end
";
    let report = remap_with(&[base, child, grandchild], "method p/Base.m ()V n\n", jdk()).unwrap();
    let out = outputs(&report);
    assert!(out[0].contains("method n ()V\n"));
    assert!(out[1].contains("method n ()V\n"));
    assert!(out[1].contains("invokespecial p/Base n ()V\n"));
    assert!(out[2].contains("method n ()V\n"));
    assert!(out[2].contains("invokevirtual q/Grandchild n ()V\n"));
}

#[test]
fn library_methods_reach_input_overrides() {
    let dir = tempfile::tempdir().unwrap();
    let jar = dir.path().join("lib.jar");
    let mut writer = zip::ZipWriter::new(File::create(&jar).unwrap());
    writer
        .start_file("lib/Plugin.class", zip::write::SimpleFileOptions::default())
        .unwrap();
    writer
        .write_all(&support::assemble(
            "
class public super abstract lib/Plugin extends java/lang/Object
method public abstract start ()V
end
",
        ))
        .unwrap();
    writer.finish().unwrap();

    let plugin = "
class public super app/Impl extends lib/Plugin
method public start ()V
  return
end
";
    let mut chain = jvm_remap::hierarchy::ClassPathChain::default();
    chain.push(classpath::open(&jar).unwrap());
    chain.push(jdk());
    let report = remap_with(&[plugin], "method lib/Plugin.start ()V enable\n", Arc::new(chain)).unwrap();
    assert!(outputs(&report)[0].contains("method enable ()V\n"));
}

#[test]
fn renamed_classes_leave_no_trace() {
    let foo = "
class public super x/Foo extends java/lang/Object
field public next Lx/Foo;
method public copy (Lx/Foo;)[Lx/Foo;
  iconst_1
  anewarray x/Foo
  areturn
end
";
    let user = "
class public super x/User extends java/lang/Object
field private foo Lx/Foo;
method public use ()V
  aload_0
  getfield x/User foo Lx/Foo;
  checkcast x/Foo
  getfield x/Foo next Lx/Foo;
  ldc class x/Foo
  pop
  pop
  return
end
";
    let report = remap_with(&[foo, user], "class x/Foo y/Bar\n", jdk()).unwrap();
    for (_, bytes) in report.written() {
        assert!(!support::disassemble(bytes).contains("Foo"));
        assert!(!bytes.windows(5).any(|w| w == b"x/Foo"));
    }
    let out = outputs(&report);
    assert!(out[0].contains("method copy (Ly/Bar;)[Ly/Bar;\n"));
    assert!(out[1].contains("  getfield y/Bar next Ly/Bar;\n"));
    assert!(out[1].contains("  ldc class y/Bar\n"));
}

#[test]
fn ambiguous_mappings_stop_before_rewriting() {
    let err = parse_mappings("class A Same\nclass B Same\n").unwrap_err();
    assert!(matches!(err, RemapError::AmbiguousMapping(_)));

    let err = remap_with(&[A, B], "class A B\n", jdk()).unwrap_err();
    assert!(matches!(err, RemapError::AmbiguousMapping(_)), "{err}");

    let err = remap_with(&[A, B], "class A java/lang/Object\n", jdk()).unwrap_err();
    assert!(matches!(err, RemapError::AmbiguousMapping(_)), "{err}");
}

#[test]
fn identity_mapping_changes_nothing() {
    let report = remap_with(
        &[A, B],
        "class A A\n\
         class B B\n\
         method A.run ()V run\n\
         method B.value ()I value\n",
        jdk(),
    )
    .unwrap();
    let originals = [support::assemble(A), support::assemble(B)];
    for ((_, bytes), original) in report.written().zip(&originals) {
        assert_eq!(parse(bytes).unwrap(), parse(original).unwrap());
    }
}

#[test]
fn one_bad_file_does_not_sink_the_batch() {
    let mut inputs = vec![
        ClassInput::new("A.class", support::assemble(A)),
        ClassInput::new("broken.class", support::assemble(B)[..20].to_vec()),
    ];
    inputs.push(ClassInput::new("B.class", support::assemble(B)));
    let run = RemapRun::new(
        RemapConfig::default(),
        Arc::new(parse_mappings("class A AA\n").unwrap()),
        jdk(),
    );
    let report = run.run(inputs, &CancelToken::new()).unwrap();
    assert!(matches!(
        report.files[1].outcome,
        FileOutcome::Failed(RemapError::MalformedClassFile { .. })
    ));
    assert_eq!(report.written().count(), 2);
}

#[test]
fn missing_classpath_entries_are_warnings() {
    let report = remap_with(&[A, B], "class A AA\n", Arc::new(MemoryClassPath::new())).unwrap();
    assert!(report.is_success());
    assert!(
        report
            .diagnostics
            .iter()
            .any(|d| d.kind == DiagnosticKind::UnresolvedClasspathEntry && d.subject == "java/lang/Object")
    );

    let strict = RemapConfig {
        fail_on_unresolved: true,
        ..RemapConfig::default()
    };
    let run = RemapRun::new(
        strict,
        Arc::new(parse_mappings("class A AA\n").unwrap()),
        Arc::new(MemoryClassPath::new()),
    );
    let result = run.run(
        vec![ClassInput::new("A.class", support::assemble(A))],
        &CancelToken::new(),
    );
    assert!(matches!(result, Err(RemapError::UnresolvedClasspathEntry(_))));
}

#[test]
fn cancellation_discards_the_run() {
    let cancel = CancelToken::new();
    let run = RemapRun::new(
        RemapConfig::default(),
        Arc::new(parse_mappings("class A AA\n").unwrap()),
        jdk(),
    );
    cancel.clone().cancel();
    let result = run.run(vec![ClassInput::new("A.class", support::assemble(A))], &cancel);
    assert!(matches!(result, Err(RemapError::Cancelled)));
}

/// Answers every load after a delay.
#[derive(Debug)]
struct SlowClassPath {
    inner: Arc<dyn ClassPath>,
    delay: Duration,
    loads: AtomicUsize,
}

impl SlowClassPath {
    fn new(delay: Duration) -> Self {
        SlowClassPath {
            inner: jdk(),
            delay,
            loads: AtomicUsize::new(0),
        }
    }
}

impl ClassPath for SlowClassPath {
    fn load(&self, name: &str) -> io::Result<Option<Vec<u8>>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.delay);
        self.inner.load(name)
    }
}

#[test]
fn slow_classpath_loads_time_out() {
    let config = RemapConfig {
        classpath_timeout_ms: Some(20),
        ..RemapConfig::default()
    };
    let run = RemapRun::new(
        config,
        Arc::new(parse_mappings("class A AA\n").unwrap()),
        Arc::new(SlowClassPath::new(Duration::from_millis(500))),
    );
    let report = run
        .run(vec![ClassInput::new("A.class", support::assemble(A))], &CancelToken::new())
        .unwrap();
    assert!(report.is_success(), "{report}");
    let timed_out = report
        .diagnostics
        .iter()
        .find(|d| d.kind == DiagnosticKind::UnresolvedClasspathEntry && d.subject == "java/lang/Object")
        .expect("no diagnostic for java/lang/Object");
    assert!(timed_out.message.contains("timed out"), "{timed_out}");
}

#[test]
fn concurrent_lookups_load_once() {
    let classpath = Arc::new(SlowClassPath::new(Duration::from_millis(50)));
    let resolver = HierarchyResolver::new(Arc::clone(&classpath) as Arc<dyn ClassPath>);
    let models = crossbeam::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| scope.spawn(|_| resolver.get("java/lang/Object").unwrap().unwrap()))
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect::<Vec<_>>()
    })
    .unwrap();
    assert_eq!(classpath.loads.load(Ordering::SeqCst), 1);
    assert!(models.iter().all(|model| Arc::ptr_eq(model, &models[0])));
    assert!(resolver.diagnostics().is_empty());
}

const HOLDER: &str = "
class public super x/Holder extends java/lang/Object
signature <T:Lx/Foo;>Ljava/lang/Object;
field private items Ljava/util/List; signature Ljava/util/List<Lx/Foo;>;
method public first (Ljava/lang/Object;)Ljava/util/List;
  signature <U:Lx/Foo;>(TU;)Ljava/util/List<Lx/Foo$Inner;>;
  aconst_null
  areturn
end
method public broken ()V
  signature (Lx/Foo
  return
end
";

#[test]
fn signatures_follow_renamed_classes() {
    let symbols = parse_mappings("class x/Foo y/Bar\nclass x/Foo$Inner y/Bar$Inner\n").unwrap();
    let resolver = HierarchyResolver::new(jdk());
    let remapped = jvm_remap::remap(&support::assemble_model(HOLDER), &symbols, &resolver).unwrap();
    assert_eq!(
        support::render(&remapped.class),
        "class x/Holder extends java/lang/Object\n\
         signature <T:Ly/Bar;>Ljava/lang/Object;\n\
         field items Ljava/util/List; signature Ljava/util/List<Ly/Bar;>;\n\
         method first (Ljava/lang/Object;)Ljava/util/List;\n  \
           signature <U:Ly/Bar;>(TU;)Ljava/util/List<Ly/Bar$Inner;>;\n  \
           aconst_null\n  \
           areturn\n\
         end\n\
         method broken ()V\n  \
           signature (Lx/Foo\n  \
           return\n\
         end\n"
    );
    let failures: Vec<_> = remapped
        .diagnostics
        .iter()
        .filter(|d| d.kind == DiagnosticKind::DescriptorRewriteFailure)
        .collect();
    assert_eq!(failures.len(), 1, "{failures:?}");
    assert_eq!(failures[0].subject, "x/Holder.broken()V");
}

#[test]
fn local_variable_tables_are_rewritten() {
    let user = "
class public super x/User extends java/lang/Object
method public run ()V
  aconst_null
  astore_1
  return
  local 1 foo Lx/Foo;
  local 2 broken Lx/Foo
  localtype 1 foo Lx/Holder<Lx/Foo;>;
end
";
    let report = remap_with(&[user], "class x/Foo y/Bar\n", jdk()).unwrap();
    assert!(report.is_success(), "{report}");
    assert_eq!(
        outputs(&report),
        ["class x/User extends java/lang/Object\n\
          method run ()V\n  \
            aconst_null\n  \
            astore_1\n  \
            return\n  \
            local 1 foo Ly/Bar;\n  \
            local 2 broken Lx/Foo\n  \
            localtype 1 foo Lx/Holder<Ly/Bar;>;\n\
          end\n"]
    );
    let debug: Vec<_> = report
        .diagnostics
        .iter()
        .filter(|d| d.kind == DiagnosticKind::DebugAttribute)
        .collect();
    assert_eq!(debug.len(), 1, "{debug:?}");
    assert!(debug[0].subject.ends_with("local broken"), "{}", debug[0]);
}

fn module_info(module: Module, packages: &[&str], main_class: &str) -> ClassModel {
    ClassModel {
        minor_version: 0,
        major_version: 53,
        access_flags: ClassAccessFlag::MODULE,
        name: "module-info".into(),
        super_class: None,
        interfaces: vec![],
        fields: vec![],
        methods: vec![],
        attributes: vec![
            Attribute::Module(module),
            Attribute::ModulePackages(packages.iter().map(|&p| p.into()).collect()),
            Attribute::ModuleMainClass(main_class.into()),
        ],
    }
}

fn app_module(package: &str, service: &str, provider: &str) -> Module {
    Module {
        name: "app".into(),
        flags: 0,
        version: Some("1.0".into()),
        requires: vec![ModuleRequires {
            module: "java.base".into(),
            flags: 0x8000,
            version: None,
        }],
        exports: vec![ModulePackage {
            package: package.into(),
            flags: 0,
            to: vec![],
        }],
        opens: vec![ModulePackage {
            package: package.into(),
            flags: 0,
            to: vec!["other".into()],
        }],
        uses: vec![service.into()],
        provides: vec![ModuleProvides {
            service: service.into(),
            with: vec![provider.into()],
        }],
    }
}

#[test]
fn module_descriptors_follow_renames() {
    let original = module_info(app_module("x", "x/Service", "x/Impl"), &["x"], "x/Main");
    let run = RemapRun::new(
        RemapConfig::default(),
        Arc::new(
            parse_mappings("class x/Service y/Service\nclass x/Impl y/Impl\nclass x/Main y/Main\n")
                .unwrap(),
        ),
        jdk(),
    );
    let report = run
        .run(
            vec![ClassInput::new(
                "module-info.class",
                jvm_remap::serialize(&original).unwrap(),
            )],
            &CancelToken::new(),
        )
        .unwrap();
    assert!(report.is_success(), "{report}");
    let (name, bytes) = report.written().next().unwrap();
    assert_eq!(name, "module-info");
    // parsing checks each index against the constant kind it must point at
    let remapped = parse(bytes).unwrap();
    assert_eq!(
        remapped.attributes,
        module_info(app_module("y", "y/Service", "y/Impl"), &["x", "y"], "y/Main").attributes
    );
}
