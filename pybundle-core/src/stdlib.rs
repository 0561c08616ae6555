// pybundle-core/src/stdlib.rs
//! Top-level standard-library module names per runtime minor version.
use std::collections::HashSet;

/// Modules shipped with CPython 3.8, including the private C accelerators
/// that user code occasionally imports directly.
const BASE_MODULES: &[&str] = &[
    "__future__", "__main__", "_abc", "_ast", "_asyncio", "_bisect", "_blake2", "_bootlocale",
    "_bz2", "_codecs", "_collections", "_collections_abc", "_compat_pickle", "_compression",
    "_contextvars", "_csv", "_ctypes", "_datetime", "_decimal", "_dummy_thread", "_elementtree",
    "_functools", "_hashlib", "_heapq", "_imp", "_io", "_json", "_locale", "_lzma", "_markupbase",
    "_md5", "_msi", "_multibytecodec", "_multiprocessing", "_opcode", "_operator", "_osx_support",
    "_overlapped", "_pickle", "_py_abc", "_pydecimal", "_pyio", "_queue", "_random", "_sha1",
    "_sha256", "_sha3", "_sha512", "_signal", "_sitebuiltins", "_socket", "_sqlite3", "_sre",
    "_ssl", "_stat", "_statistics", "_string", "_strptime", "_struct", "_symtable", "_thread",
    "_threading_local", "_tkinter", "_tracemalloc", "_uuid", "_warnings", "_weakref",
    "_weakrefset", "_winapi", "_xxsubinterpreters", "abc", "aifc", "antigravity", "argparse",
    "array", "ast", "asynchat", "asyncio", "asyncore", "atexit", "audioop", "base64", "bdb",
    "binascii", "binhex", "bisect", "builtins", "bz2", "calendar", "cgi", "cgitb", "chunk",
    "cmath", "cmd", "code", "codecs", "codeop", "collections", "colorsys", "compileall",
    "concurrent", "configparser", "contextlib", "contextvars", "copy", "copyreg", "cProfile",
    "crypt", "csv", "ctypes", "curses", "dataclasses", "datetime", "dbm", "decimal", "difflib",
    "dis", "distutils", "doctest", "dummy_threading", "email", "encodings", "ensurepip", "enum",
    "errno", "faulthandler", "fcntl", "filecmp", "fileinput", "fnmatch", "formatter", "fractions",
    "ftplib", "functools", "gc", "genericpath", "getopt", "getpass", "gettext", "glob", "grp",
    "gzip", "hashlib", "heapq", "hmac", "html", "http", "idlelib", "imaplib", "imghdr", "imp",
    "importlib", "inspect", "io", "ipaddress", "itertools", "json", "keyword", "lib2to3",
    "linecache", "locale", "logging", "lzma", "mailbox", "mailcap", "marshal", "math",
    "mimetypes", "mmap", "modulefinder", "msilib", "msvcrt", "multiprocessing", "netrc", "nis",
    "nntplib", "nt", "ntpath", "nturl2path", "numbers", "opcode", "operator", "optparse", "os",
    "ossaudiodev", "parser", "pathlib", "pdb", "pickle", "pickletools", "pipes", "pkgutil",
    "platform", "plistlib", "poplib", "posix", "posixpath", "pprint", "profile", "pstats", "pty",
    "pwd", "py_compile", "pyclbr", "pydoc", "pydoc_data", "pyexpat", "queue", "quopri", "random",
    "re", "readline", "reprlib", "resource", "rlcompleter", "runpy", "sched", "secrets", "select",
    "selectors", "shelve", "shlex", "shutil", "signal", "site", "smtpd", "smtplib", "sndhdr",
    "socket", "socketserver", "spwd", "sqlite3", "sre_compile", "sre_constants", "sre_parse",
    "ssl", "stat", "statistics", "string", "stringprep", "struct", "subprocess", "sunau",
    "symbol", "symtable", "sys", "sysconfig", "syslog", "tabnanny", "tarfile", "telnetlib",
    "tempfile", "termios", "textwrap", "this", "threading", "time", "timeit", "tkinter", "token",
    "tokenize", "trace", "traceback", "tracemalloc", "tty", "turtle", "turtledemo", "types",
    "typing", "unicodedata", "unittest", "urllib", "uu", "uuid", "venv", "warnings", "wave",
    "weakref", "webbrowser", "winreg", "winsound", "wsgiref", "xdrlib", "xml", "xmlrpc",
    "xxsubtype", "zipapp", "zipfile", "zipimport", "zlib",
];

/// (minor version, added, removed) relative to the previous minor.
const VERSION_DELTAS: &[(u32, &[&str], &[&str])] = &[
    (9, &["graphlib", "zoneinfo", "_zoneinfo", "_peg_parser"], &["_dummy_thread", "dummy_threading"]),
    (10, &[], &["formatter", "parser", "symbol", "_peg_parser"]),
    (11, &["tomllib", "_tokenize", "_typing"], &["binhex"]),
    (
        12,
        &[],
        &["asynchat", "asyncore", "distutils", "imp", "smtpd", "_bootlocale"],
    ),
    (
        13,
        &["_interpreters", "_interpqueues", "_interpchannels"],
        &[
            "aifc", "audioop", "cgi", "cgitb", "chunk", "crypt", "imghdr", "lib2to3", "mailcap",
            "msilib", "nis", "nntplib", "ossaudiodev", "pipes", "sndhdr", "spwd", "sunau",
            "telnetlib", "uu", "xdrlib", "_xxsubinterpreters",
        ],
    ),
];

#[derive(Debug, Clone)]
pub struct StdlibIndex {
    minor: u32,
    names: HashSet<String>,
}

impl StdlibIndex {
    /// Index for a `3.x` version string such as `3.8` or `3.8.10`.
    /// Versions older than 3.8 are treated as 3.8.
    pub fn for_version(version: &str) -> Self {
        let minor = version
            .split('.')
            .nth(1)
            .and_then(|m| m.parse::<u32>().ok())
            .unwrap_or(8);
        let mut names: HashSet<String> = BASE_MODULES.iter().map(|m| m.to_lowercase()).collect();
        for (delta_minor, added, removed) in VERSION_DELTAS {
            if *delta_minor > minor {
                break;
            }
            names.extend(added.iter().map(|m| m.to_lowercase()));
            for m in removed.iter() {
                names.remove(&m.to_lowercase());
            }
        }
        Self { minor, names }
    }

    pub fn minor(&self) -> u32 {
        self.minor
    }

    /// Case-insensitive membership test on a top-level module name.
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(&name.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_version_knows_common_modules() {
        let index = StdlibIndex::for_version("3.8.10");
        assert_eq!(index.minor(), 8);
        for name in ["os", "sys", "json", "tkinter", "cprofile", "asyncio", "distutils"] {
            assert!(index.contains(name), "{name} should be stdlib");
        }
        assert!(!index.contains("requests"));
        assert!(!index.contains("tomllib"));
    }

    #[test]
    fn later_versions_apply_deltas() {
        let index = StdlibIndex::for_version("3.12");
        assert!(index.contains("tomllib"));
        assert!(index.contains("zoneinfo"));
        assert!(!index.contains("distutils"));
        assert!(!index.contains("asyncore"));
        assert!(index.contains("aifc"));
    }
}
