// pybundle-core/src/rules.rs
//! Per-library trimming rules applied while extracting archives.
use std::collections::HashMap;

use once_cell::sync::Lazy;
use pybundle_common::error::{BundleError, Result};
use pybundle_common::model::normalize_name;
use regex::Regex;

/// Always excluded, on top of any rule's own exclusions.
const DEFAULT_EXCLUDES: &[&str] = &[r"[^/]*\.dist-info/", r".*__pycache__/"];

/// Import names whose distribution is published under another name.
const ALIASES: &[(&str, &str)] = &[
    ("pil", "pillow"),
    ("docx", "python-docx"),
    ("win32com", "pywin32"),
    ("yaml", "pyyaml"),
    ("zstd", "zstandard"),
    ("cv2", "opencv-python"),
    ("sklearn", "scikit-learn"),
    ("bs4", "beautifulsoup4"),
    ("dateutil", "python-dateutil"),
];

struct RuleSpec {
    name: &'static str,
    include: &'static [&'static str],
    exclude: &'static [&'static str],
    children: &'static [&'static str],
    marker: Option<&'static str>,
}

const STUBS: &str = r".*\.pyi$";

const RULE_SPECS: &[RuleSpec] = &[
    // Desktop GUI
    RuleSpec {
        name: "pyside2",
        include: &[
            r"PySide2/__init__\.py",
            r"PySide2/pyside2\.abi3\.dll",
            r"PySide2/Qt5?Core",
            r"PySide2/Qt5?Gui",
            r"PySide2/Qt5?Widgets",
            r"PySide2/Qt5?Network\.dll",
            r"PySide2/Qt5?Network\.py.*",
            r"PySide2/Qt5?Qml\.dll",
            r"PySide2/Qt5?Qml\.py.*",
            r"PySide2/plugins/iconengines/qsvgicon\.dll",
            r"PySide2/plugins/imageformats/.*\.dll",
            r"PySide2/plugins/platforms/.*\.dll",
        ],
        exclude: &[STUBS],
        children: &["shiboken2", "six"],
        marker: Some("PySide2"),
    },
    RuleSpec {
        name: "shiboken2",
        include: &[r"shiboken2/"],
        exclude: &[r"shiboken2/docs/", STUBS],
        children: &[],
        marker: Some("shiboken2"),
    },
    RuleSpec {
        name: "pyqt5",
        include: &[
            r"PyQt5/__init__\.py",
            r"PyQt5/sip\.",
            r"PyQt5/Qt(Core|Gui|Widgets)\.",
        ],
        exclude: &[STUBS],
        children: &["pyqt5-sip", "pyqt5-qt5"],
        marker: Some("PyQt5/__init__.py"),
    },
    RuleSpec {
        name: "pyqt5-qt5",
        include: &[
            r"PyQt5/Qt5?/bin/Qt5(Core|Gui|Widgets)\.dll",
            r"PyQt5/Qt5?/bin/(libEGL|libGLESv2|opengl32sw|d3dcompiler_47)\.dll",
            r"PyQt5/Qt5?/plugins/(platforms|imageformats|styles)/",
        ],
        exclude: &[],
        children: &[],
        marker: Some("PyQt5/Qt5"),
    },
    // Light GUI
    RuleSpec {
        name: "pygame",
        include: &[],
        exclude: &[r"pygame/docs/", r"pygame/examples/", r"pygame/tests/", STUBS],
        children: &[],
        marker: Some("pygame"),
    },
    // Plotting
    RuleSpec {
        name: "matplotlib",
        include: &[
            r"matplotlib/",
            r"matplotlib\.libs/",
            r"mpl_toolkits/",
            r"matplotlib-.*-nspkg\.pth",
            r"pylab\.py",
        ],
        exclude: &[
            r"matplotlib/tests/",
            r"mpl_toolkits/.*/tests/",
            r"matplotlib/mpl-data/sample_data/",
            STUBS,
        ],
        children: &[
            "contourpy",
            "cycler",
            "importlib-resources",
            "numpy",
            "packaging",
            "pillow",
            "pyparsing",
            "python-dateutil",
            "zipp",
        ],
        marker: Some("matplotlib"),
    },
    RuleSpec {
        name: "pillow",
        include: &[r"PIL/", r"pillow\.libs/"],
        exclude: &[STUBS],
        children: &[],
        marker: Some("PIL"),
    },
    // Numeric
    RuleSpec {
        name: "numpy",
        include: &[r"numpy/", r"numpy\.libs/"],
        exclude: &[r"numpy/tests/", r"numpy/.*/tests/", r"numpy/doc/", STUBS],
        children: &[],
        marker: Some("numpy"),
    },
    // Data-frame
    RuleSpec {
        name: "pandas",
        include: &[r"pandas/"],
        exclude: &[r"pandas/tests/", STUBS],
        children: &["numpy", "python-dateutil", "pytz"],
        marker: Some("pandas"),
    },
    RuleSpec {
        name: "python-dateutil",
        include: &[r"dateutil/"],
        exclude: &[],
        children: &["six"],
        marker: Some("dateutil"),
    },
    // JIT
    RuleSpec {
        name: "numba",
        include: &[r"numba/"],
        exclude: &[r"numba/tests/", r"numba/.*/tests/", STUBS],
        children: &["cffi", "importlib-metadata", "llvmlite", "pycparser"],
        marker: Some("numba"),
    },
    RuleSpec {
        name: "llvmlite",
        include: &[r"llvmlite/"],
        exclude: &[r"llvmlite/tests/"],
        children: &[],
        marker: Some("llvmlite"),
    },
    RuleSpec {
        name: "cffi",
        include: &[r"cffi/", r"_cffi_backend\."],
        exclude: &[],
        children: &[],
        marker: Some("cffi"),
    },
    // Tensor / ML
    RuleSpec {
        name: "torch",
        include: &[r"torch/", r"functorch/"],
        exclude: &[
            r"torch/include/",
            r"torch/share/cmake/",
            r"torch/test/",
            r"torch/testing/_internal/",
            r"torch/lib/.*\.lib$",
            STUBS,
        ],
        children: &[],
        marker: Some("torch"),
    },
    // Packages whose import name differs from the distribution name.
    RuleSpec {
        name: "pyyaml",
        include: &[],
        exclude: &[],
        children: &[],
        marker: Some("yaml"),
    },
    RuleSpec {
        name: "python-docx",
        include: &[],
        exclude: &[],
        children: &[],
        marker: Some("docx"),
    },
    RuleSpec {
        name: "pywin32",
        include: &[],
        exclude: &[],
        children: &[],
        marker: Some("win32com"),
    },
    RuleSpec {
        name: "opencv-python",
        include: &[],
        exclude: &[],
        children: &[],
        marker: Some("cv2"),
    },
    RuleSpec {
        name: "scikit-learn",
        include: &[],
        exclude: &[r"sklearn/.*/tests/", r"sklearn/tests/"],
        children: &[],
        marker: Some("sklearn"),
    },
    RuleSpec {
        name: "beautifulsoup4",
        include: &[],
        exclude: &[],
        children: &[],
        marker: Some("bs4"),
    },
];

/// Maps an import name to its distribution name.
pub fn resolve_alias(name: &str) -> String {
    let normalized = normalize_name(name);
    ALIASES
        .iter()
        .find(|(alias, _)| normalize_name(alias) == normalized)
        .map(|(_, dist)| dist.to_string())
        .unwrap_or(normalized)
}

fn compile(patterns: &[&str]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(&format!("^(?:{p})"))
                .map_err(|e| BundleError::ValidationError(format!("Bad rule pattern '{p}': {e}")))
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct ExtractionRule {
    pub name: String,
    include: Vec<Regex>,
    exclude: Vec<Regex>,
    pub children: Vec<String>,
    pub marker: Option<String>,
}

impl ExtractionRule {
    /// Builds a rule from prefix-anchored patterns. The default metadata
    /// exclusions are always added.
    pub fn new(
        name: &str,
        include: &[&str],
        exclude: &[&str],
        children: &[&str],
        marker: Option<&str>,
    ) -> Result<Self> {
        let mut excludes: Vec<&str> = DEFAULT_EXCLUDES.to_vec();
        excludes.extend_from_slice(exclude);
        Ok(Self {
            name: normalize_name(name),
            include: compile(include)?,
            exclude: compile(&excludes)?,
            children: children.iter().map(|c| normalize_name(c)).collect(),
            marker: marker.map(str::to_string),
        })
    }

    /// Everything except metadata.
    pub fn default_for(name: &str) -> Result<Self> {
        Self::new(name, &[], &[], &[], None)
    }

    /// Whether an archive-internal path survives this rule.
    pub fn allows(&self, path: &str) -> bool {
        if self.exclude.iter().any(|re| re.is_match(path)) {
            return false;
        }
        self.include.is_empty() || self.include.iter().any(|re| re.is_match(path))
    }

    pub fn has_includes(&self) -> bool {
        !self.include.is_empty()
    }
}

pub struct RuleTable {
    rules: HashMap<String, ExtractionRule>,
}

static BUILTIN: Lazy<std::result::Result<RuleTable, BundleError>> = Lazy::new(|| {
    let mut rules = HashMap::new();
    for spec in RULE_SPECS {
        let rule = ExtractionRule::new(
            spec.name,
            spec.include,
            spec.exclude,
            spec.children,
            spec.marker,
        )?;
        rules.insert(rule.name.clone(), rule);
    }
    Ok(RuleTable { rules })
});

impl RuleTable {
    /// The built-in library families, compiled once per process.
    pub fn builtin() -> Result<&'static RuleTable> {
        let table: &'static std::result::Result<RuleTable, BundleError> = &BUILTIN;
        table.as_ref().map_err(Clone::clone)
    }

    pub fn get(&self, name: &str) -> Option<&ExtractionRule> {
        self.rules.get(&normalize_name(name))
    }

    /// The registered rule for `name`, or the default rule.
    pub fn rule_for(&self, name: &str) -> Result<ExtractionRule> {
        match self.get(name) {
            Some(rule) => Ok(rule.clone()),
            None => ExtractionRule::default_for(name),
        }
    }
}
