//! Bean tree rendering: flat listing, domain listing and full detail.
//!
//! Every shape walks the registry in canonical name order, so repeated
//! renders against an unchanged registry are byte-identical. Per-bean and
//! per-attribute failures are logged and skipped; they never abort a page.

use std::io::{self, Write};

use tracing::warn;

use crate::registry::{BeanDescriptor, BeanName, BeanRegistry};

/// Line between beans in the detail report.
pub const BEAN_SEPARATOR: &str = "-----------------------------";

/// Placeholder value for an attribute that could not be read.
pub const SKIPPED: &str = "<skipped>";

/// One bean name per line, sorted.
pub fn render_bean_list(registry: &BeanRegistry, out: &mut dyn Write) -> io::Result<()> {
    for name in registry.query_all() {
        writeln!(out, "{name}")?;
    }
    Ok(())
}

/// Default domain followed by every registered domain.
pub fn render_domains(registry: &BeanRegistry, out: &mut dyn Write) -> io::Result<()> {
    writeln!(out, "default: {}", registry.default_domain())?;
    writeln!(out, "domains:")?;
    for domain in registry.domains() {
        writeln!(out, "  - {domain}")?;
    }
    Ok(())
}

/// Attributes and operations of every bean.
pub fn render_bean_details(registry: &BeanRegistry, out: &mut dyn Write) -> io::Result<()> {
    for name in registry.query_all() {
        let Some(descriptor) = describe_or_skip(registry, &name) else {
            continue;
        };

        writeln!(out, "{name}")?;
        for attr in &descriptor.attributes {
            write!(out, "  {},{},{},", attr.name, attr.type_name, attr.description)?;
            match registry.get_attribute(&name, &attr.name) {
                Ok(value) => writeln!(out, "{value}")?,
                Err(e) => {
                    warn!("error getting attribute {} for {}: {}", attr.name, name, e);
                    writeln!(out, "{SKIPPED}")?;
                }
            }
        }
        writeln!(out)?;
        for op in &descriptor.operations {
            write!(out, "  {},{}(", op.return_type, op.name)?;
            for param in &op.parameters {
                write!(out, "{} {},", param.type_name, param.name)?;
            }
            writeln!(out, "),{}", op.description)?;
        }
        write!(out, "\n{BEAN_SEPARATOR}\n\n")?;
    }
    Ok(())
}

/// Compact detail shape used for web modules: unindented attribute rows,
/// then `name,returnType,description` operation rows.
pub fn render_module_details(
    registry: &BeanRegistry,
    pattern: &str,
    out: &mut dyn Write,
) -> io::Result<()> {
    for name in registry.find_beans(pattern) {
        let Some(descriptor) = describe_or_skip(registry, &name) else {
            continue;
        };

        for attr in &descriptor.attributes {
            write!(out, "{},{},{},", attr.name, attr.type_name, attr.description)?;
            match registry.get_attribute(&name, &attr.name) {
                Ok(value) => writeln!(out, "{value}")?,
                Err(e) => {
                    warn!("error getting attribute {} for {}: {}", attr.name, name, e);
                    writeln!(out, "{SKIPPED}")?;
                }
            }
        }
        writeln!(out)?;
        for op in &descriptor.operations {
            writeln!(out, "{},{},{}", op.name, op.return_type, op.description)?;
        }
        write!(out, "\n\n")?;
    }
    Ok(())
}

/// Reads the listed attributes of every bean matching `pattern` and writes
/// them comma-separated, one bean per line. A bean whose row cannot be read
/// completely is logged and left out.
pub fn render_attribute_rows(
    registry: &BeanRegistry,
    pattern: &str,
    attributes: &[&str],
    out: &mut dyn Write,
) -> io::Result<()> {
    'beans: for name in registry.find_beans(pattern) {
        let mut row = Vec::with_capacity(attributes.len());
        for attribute in attributes {
            match registry.get_attribute(&name, attribute) {
                Ok(value) => row.push(value.to_string()),
                Err(e) => {
                    warn!("skipping {}: {}", name, e);
                    continue 'beans;
                }
            }
        }
        writeln!(out, "{}", row.join(","))?;
    }
    Ok(())
}

fn describe_or_skip(registry: &BeanRegistry, name: &BeanName) -> Option<BeanDescriptor> {
    match registry.get_descriptor(name) {
        Ok(d) => Some(d),
        Err(e) => {
            warn!("skipping bean {}: {}", name, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{DynamicBean, OperationInfo};
    use std::sync::Arc;

    fn sample_registry() -> BeanRegistry {
        let registry = BeanRegistry::new("DefaultDomain");
        registry
            .register_named(
                "b:type=Pool",
                Arc::new(
                    DynamicBean::new()
                        .attribute("size", "int", "pool size", || 4u64)
                        .fallible_attribute("state", "String", "lifecycle", || {
                            Err("stopping".into())
                        })
                        .operation(
                            OperationInfo::new("resize", "void", "change size")
                                .param("int", "size")
                                .param("boolean", "force"),
                        ),
                ),
            )
            .unwrap();
        registry
            .register_named(
                "a:type=Cache",
                Arc::new(DynamicBean::new().attribute("hits", "long", "", || 10u64)),
            )
            .unwrap();
        registry
    }

    fn render(f: impl Fn(&mut dyn Write) -> io::Result<()>) -> String {
        let mut buf = Vec::new();
        f(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_bean_list_is_sorted() {
        let registry = sample_registry();
        let text = render(|out| render_bean_list(&registry, out));
        assert_eq!(text, "a:type=Cache\nb:type=Pool\n");
    }

    #[test]
    fn test_domain_listing() {
        let registry = sample_registry();
        let text = render(|out| render_domains(&registry, out));
        assert_eq!(text, "default: DefaultDomain\ndomains:\n  - a\n  - b\n");
    }

    #[test]
    fn test_details_tolerate_failing_attribute() {
        let registry = sample_registry();
        let text = render(|out| render_bean_details(&registry, out));
        let expected = "a:type=Cache\n  hits,long,,10\n\n\n-----------------------------\n\n\
                        b:type=Pool\n  size,int,pool size,4\n  state,String,lifecycle,<skipped>\n\n\
                        \x20 void,resize(int size,boolean force,),change size\n\n-----------------------------\n\n";
        assert_eq!(text, expected);
    }

    #[test]
    fn test_repeated_renders_are_identical() {
        let registry = sample_registry();
        let first = render(|out| render_bean_details(&registry, out));
        let second = render(|out| render_bean_details(&registry, out));
        assert_eq!(first, second);
    }

    #[test]
    fn test_attribute_rows_skip_incomplete_beans() {
        let registry = sample_registry();
        let text = render(|out| render_attribute_rows(&registry, "*:*", &["size"], out));
        assert_eq!(text, "4\n");
    }

    #[test]
    fn test_module_details_shape() {
        let registry = sample_registry();
        let text = render(|out| render_module_details(&registry, "b:type=Pool", out));
        assert_eq!(
            text,
            "size,int,pool size,4\nstate,String,lifecycle,<skipped>\n\nresize,void,change size\n\n\n"
        );
    }
}
