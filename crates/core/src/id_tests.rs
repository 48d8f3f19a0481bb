use super::*;

#[test]
fn default_project_is_named_default() {
    let p = ProjectName::default_project();
    assert!(p.is_default());
    assert_eq!(p.as_str(), "default");
}

#[test]
fn project_name_equality_with_str() {
    let p = ProjectName::new("alpha");
    assert_eq!(p, *"alpha");
    assert!(!p.is_default());
}

#[test]
fn request_id_generate_is_nonempty_and_unique() {
    let a = RequestId::generate();
    let b = RequestId::generate();
    assert!(!a.as_str().is_empty());
    assert_ne!(a, b);
}
