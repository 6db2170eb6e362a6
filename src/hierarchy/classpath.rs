use std::{
    collections::HashMap,
    fmt::Debug,
    fs::{self, File},
    io::{self, Read},
    path::{Path, PathBuf},
    sync::Arc,
};

use parking_lot::Mutex;
use zip::{ZipArchive, result::ZipError};

/// Where the resolver finds classes that are referenced but not being remapped.
///
/// `name` is an internal name such as `java/lang/Object`. Not finding a class is
/// `Ok(None)`, errors are reserved for I/O failures.
pub trait ClassPath: Debug + Send + Sync {
    fn load(&self, name: &str) -> io::Result<Option<Vec<u8>>>;
}

/// Opens a directory or a jar/jmod archive.
pub fn open(path: impl AsRef<Path>) -> io::Result<Arc<dyn ClassPath>> {
    let path = path.as_ref();
    if path.is_dir() {
        return Ok(Arc::new(DirectoryClassPath::new(path)));
    }
    if path.extension().is_some_and(|ext| ext == "jmod") {
        return Ok(Arc::new(JarClassPath::jmod(path)?));
    }
    Ok(Arc::new(JarClassPath::open(path)?))
}

#[derive(Debug)]
pub struct DirectoryClassPath {
    base_path: PathBuf,
}

impl DirectoryClassPath {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }
}

impl ClassPath for DirectoryClassPath {
    fn load(&self, name: &str) -> io::Result<Option<Vec<u8>>> {
        match fs::read(self.base_path.join(format!("{name}.class"))) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }
}

/// A zip archive. Reads go through one lock since `ZipArchive` needs `&mut` access.
#[derive(Debug)]
pub struct JarClassPath {
    path: PathBuf,
    prefix: &'static str,
    zip_file: Mutex<ZipArchive<File>>,
}

impl JarClassPath {
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        Self::with_prefix(path.into(), "")
    }

    /// A JDK module file, which keeps its classes under `classes/`.
    pub fn jmod(path: impl Into<PathBuf>) -> io::Result<Self> {
        Self::with_prefix(path.into(), "classes/")
    }

    fn with_prefix(path: PathBuf, prefix: &'static str) -> io::Result<Self> {
        let file = File::open(&path)?;
        // the zip reader skips the header jmod files put in front of the archive
        let archive = ZipArchive::new(file).map_err(io::Error::from)?;
        Ok(JarClassPath {
            path,
            prefix,
            zip_file: Mutex::new(archive),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ClassPath for JarClassPath {
    fn load(&self, name: &str) -> io::Result<Option<Vec<u8>>> {
        let mut archive = self.zip_file.lock();
        let mut class_file = match archive.by_name(&format!("{}{name}.class", self.prefix)) {
            Ok(file) => file,
            Err(ZipError::FileNotFound) => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let mut content = Vec::with_capacity(class_file.size() as usize);
        class_file.read_to_end(&mut content)?;
        Ok(Some(content))
    }
}

/// Classes held in memory, keyed by internal name.
#[derive(Debug, Default)]
pub struct MemoryClassPath {
    classes: HashMap<String, Vec<u8>>,
}

impl MemoryClassPath {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, bytes: Vec<u8>) {
        self.classes.insert(name.into(), bytes);
    }
}

impl FromIterator<(String, Vec<u8>)> for MemoryClassPath {
    fn from_iter<T: IntoIterator<Item = (String, Vec<u8>)>>(iter: T) -> Self {
        MemoryClassPath {
            classes: iter.into_iter().collect(),
        }
    }
}

impl ClassPath for MemoryClassPath {
    fn load(&self, name: &str) -> io::Result<Option<Vec<u8>>> {
        Ok(self.classes.get(name).cloned())
    }
}

/// Tries each entry in order, the first hit wins.
#[derive(Debug, Default)]
pub struct ClassPathChain {
    entries: Vec<Arc<dyn ClassPath>>,
}

impl ClassPathChain {
    pub fn new(entries: Vec<Arc<dyn ClassPath>>) -> Self {
        Self { entries }
    }

    pub fn push(&mut self, entry: Arc<dyn ClassPath>) {
        self.entries.push(entry);
    }
}

impl ClassPath for ClassPathChain {
    fn load(&self, name: &str) -> io::Result<Option<Vec<u8>>> {
        for entry in &self.entries {
            if let Some(bytes) = entry.load(name)? {
                return Ok(Some(bytes));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use zip::write::SimpleFileOptions;

    use super::*;

    #[test]
    fn directory_lookup() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a")).unwrap();
        fs::write(dir.path().join("a/B.class"), [1, 2, 3]).unwrap();
        let classpath = DirectoryClassPath::new(dir.path());
        assert_eq!(classpath.load("a/B").unwrap(), Some(vec![1, 2, 3]));
        assert_eq!(classpath.load("a/C").unwrap(), None);
    }

    #[test]
    fn jar_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lib.jar");
        let mut writer = zip::ZipWriter::new(File::create(&path).unwrap());
        writer
            .start_file("a/B.class", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(&[4, 5]).unwrap();
        writer.finish().unwrap();

        let classpath = open(&path).unwrap();
        assert_eq!(classpath.load("a/B").unwrap(), Some(vec![4, 5]));
        assert_eq!(classpath.load("a/C").unwrap(), None);
    }

    #[test]
    fn chain_prefers_earlier_entries() {
        let mut first = MemoryClassPath::new();
        first.insert("a/B", vec![1]);
        let second: MemoryClassPath =
            [("a/B".to_string(), vec![2]), ("a/C".to_string(), vec![3])]
                .into_iter()
                .collect();
        let entries: Vec<Arc<dyn ClassPath>> = vec![Arc::new(first), Arc::new(second)];
        let chain = ClassPathChain::new(entries);
        assert_eq!(chain.load("a/B").unwrap(), Some(vec![1]));
        assert_eq!(chain.load("a/C").unwrap(), Some(vec![3]));
        assert_eq!(chain.load("a/D").unwrap(), None);
    }
}
