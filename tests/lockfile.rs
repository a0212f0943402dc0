//! Black-box smoke coverage of the `Lockfile` parser/serializer, the way
//! `tests/resolver.rs` exercises the resolver's public surface. The
//! section-by-section and round-trip edge cases live as `#[cfg(test)]`
//! unit tests alongside `Lockfile` itself.

use gem_definition::Lockfile;

#[test]
fn parses_a_complete_lockfile() {
    let content = "\
GEM
  remote: https://rubygems.org/
  specs:
    rack (3.0.8)
    rails (7.0.8)
      actionpack (= 7.0.8)
      activesupport (= 7.0.8)

PLATFORMS
  ruby
  arm64-darwin

DEPENDENCIES
  rails (~> 7.0)

RUBY VERSION
   ruby 3.3.0p0

BUNDLED WITH
   2.5.3
";

    let lockfile = Lockfile::parse(content).unwrap();
    assert_eq!(lockfile.gems.len(), 2);
    assert_eq!(lockfile.gems[0].name, "rack");
    assert_eq!(lockfile.gems[1].dependencies.len(), 2);
    assert_eq!(lockfile.platforms.len(), 2);
    assert_eq!(lockfile.ruby_version.as_deref(), Some("ruby 3.3.0p0"));
    assert_eq!(lockfile.bundled_with.as_deref(), Some("2.5.3"));
}

#[test]
fn parses_a_platform_specific_gem() {
    let content = "\
GEM
  remote: https://rubygems.org/
  specs:
    nokogiri (1.14.0-arm64-darwin)
      racc (~> 1.4)

PLATFORMS
  arm64-darwin

DEPENDENCIES
  nokogiri
";

    let lockfile = Lockfile::parse(content).unwrap();
    assert_eq!(lockfile.gems[0].platform.as_deref(), Some("arm64-darwin"));
    assert_eq!(lockfile.gems[0].full_name_with_platform(), "nokogiri-1.14.0-arm64-darwin");
}

#[test]
fn render_round_trips_crlf_line_endings() {
    let content = "GEM\r\n  remote: https://rubygems.org/\r\n  specs:\r\n    rack (3.0.8)\r\n\r\nPLATFORMS\r\n  ruby\r\n\r\nDEPENDENCIES\r\n  rack\r\n";

    let lockfile = Lockfile::parse(content).unwrap();
    assert!(lockfile.uses_crlf);
    assert!(lockfile.render().contains("\r\n"));
}

#[test]
fn unknown_sections_survive_a_round_trip() {
    let content = "\
GEM
  remote: https://rubygems.org/
  specs:
    rack (3.0.8)

PLATFORMS
  ruby

DEPENDENCIES
  rack

FROZEN
  true
";

    let lockfile = Lockfile::parse(content).unwrap();
    assert_eq!(lockfile.unknown_sections.len(), 1);
    assert_eq!(lockfile.unknown_sections[0].header, "FROZEN");

    let rendered = lockfile.render();
    assert!(rendered.contains("FROZEN"));
    assert!(rendered.contains("true"));
}
