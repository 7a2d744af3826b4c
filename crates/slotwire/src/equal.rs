use std::collections::{HashMap, HashSet};

use crate::value::{Document, Node, NodeId, Value};

/// Structural equality between two documents that may contain cycles.
///
/// Two documents are equal when there is a one-to-one mapping between their
/// nodes under which every node has the same kind and equal contents. A
/// document whose root references itself therefore equals another such
/// document, but not one that holds two separate copies.
///
/// Numbers compare the way the wire format distinguishes them: `NaN` equals
/// `NaN`, and `-0` differs from `0`. Settled deferred values compare by
/// status and settled document; sequences compare only by whether they have
/// been consumed.
///
/// # Examples
///
/// ```
/// use slotwire::{deep_equal, Document};
///
/// let mut a = Document::new();
/// let rec = a.record();
/// a.set_field(rec, "self", rec);
/// a.set_root(rec);
///
/// let mut b = Document::new();
/// let rec = b.record();
/// b.set_field(rec, "self", rec);
/// b.set_root(rec);
///
/// assert!(deep_equal(&a, &b));
/// ```
pub fn deep_equal(a: &Document, b: &Document) -> bool {
    Matcher::default().documents(a, b)
}

/// Whether two numbers are the same wire value.
pub fn same_number(a: f64, b: f64) -> bool {
    if a.is_nan() || b.is_nan() {
        return a.is_nan() && b.is_nan();
    }
    a == b && a.is_sign_negative() == b.is_sign_negative()
}

#[derive(Default)]
struct Matcher {
    /// Deferred pairs already under comparison; revisiting one is a match.
    handles: HashSet<(usize, usize)>,
}

/// Node bijection for one pair of documents.
#[derive(Default)]
struct Scope {
    forward: HashMap<NodeId, NodeId>,
    backward: HashMap<NodeId, NodeId>,
}

impl Matcher {
    fn documents(&mut self, a: &Document, b: &Document) -> bool {
        let mut scope = Scope::default();
        self.value(&mut scope, a, b, a.root(), b.root())
    }

    fn value(&mut self, scope: &mut Scope, da: &Document, db: &Document, a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Number(x), Value::Number(y)) => same_number(*x, *y),
            (Value::Node(x), Value::Node(y)) => self.node(scope, da, db, *x, *y),
            _ => a == b,
        }
    }

    fn values(&mut self, scope: &mut Scope, da: &Document, db: &Document, a: &[Value], b: &[Value]) -> bool {
        a.len() == b.len()
            && a
                .iter()
                .zip(b)
                .all(|(x, y)| self.value(scope, da, db, x, y))
    }

    fn node(&mut self, scope: &mut Scope, da: &Document, db: &Document, a: NodeId, b: NodeId) -> bool {
        if let Some(mapped) = scope.forward.get(&a) {
            return *mapped == b;
        }
        if scope.backward.contains_key(&b) {
            return false;
        }
        scope.forward.insert(a, b);
        scope.backward.insert(b, a);
        let (Some(na), Some(nb)) = (da.get(a), db.get(b)) else {
            return false;
        };
        match (na, nb) {
            (Node::List(x), Node::List(y)) | (Node::Set(x), Node::Set(y)) => {
                self.values(scope, da, db, x, y)
            }
            (Node::Map(x), Node::Map(y)) => {
                x.len() == y.len()
                    && x.iter().zip(y).all(|((ka, va), (kb, vb))| {
                        self.value(scope, da, db, ka, kb) && self.value(scope, da, db, va, vb)
                    })
            }
            (Node::Record(x), Node::Record(y)) => {
                x.len() == y.len()
                    && x.iter().all(|(key, va)| match y.get(key) {
                        Some(vb) => self.value(scope, da, db, va, vb),
                        None => false,
                    })
            }
            (
                Node::Error {
                    name: na,
                    message: ma,
                },
                Node::Error {
                    name: nb,
                    message: mb,
                },
            ) => na == nb && ma == mb,
            (Node::Buffer(x), Node::Buffer(y)) => x == y,
            (Node::Form(x), Node::Form(y)) => x == y,
            (Node::Deferred(x), Node::Deferred(y)) => {
                if x.same(y) || !self.handles.insert((x.key(), y.key())) {
                    return true;
                }
                match (x.settlement(), y.settlement()) {
                    (None, None) => true,
                    (Some(sx), Some(sy)) => {
                        sx.status() == sy.status() && self.documents(sx.document(), sy.document())
                    }
                    _ => false,
                }
            }
            (Node::Sequence(x), Node::Sequence(y)) => x.is_consumed() == y.is_consumed(),
            (Node::Host(x), Node::Host(y)) => x.type_name == y.type_name,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deferred::Deferred;

    #[test]
    fn wire_number_identity() {
        assert!(same_number(f64::NAN, f64::NAN));
        assert!(!same_number(0.0, -0.0));
        assert!(same_number(-0.0, -0.0));
        assert!(!same_number(1.0, f64::NAN));
    }

    #[test]
    fn shared_child_differs_from_two_copies() {
        let mut shared = Document::new();
        let child = shared.list(vec![]);
        let root = shared.list(vec![Value::Node(child), Value::Node(child)]);
        shared.set_root(root);

        let mut copies = Document::new();
        let c1 = copies.list(vec![]);
        let c2 = copies.list(vec![]);
        let root = copies.list(vec![Value::Node(c1), Value::Node(c2)]);
        copies.set_root(root);

        assert!(deep_equal(&shared, &shared.clone()));
        assert!(!deep_equal(&shared, &copies));
        assert!(!deep_equal(&copies, &shared));
    }

    #[test]
    fn self_resolving_deferreds_terminate() {
        let make = || {
            let deferred = Deferred::new();
            deferred.resolve(Document::from_node(Node::Deferred(deferred.clone())));
            Document::from_node(Node::Deferred(deferred))
        };
        assert!(deep_equal(&make(), &make()));
    }

    #[test]
    fn settlement_status_matters() {
        let ok = Document::from_node(Node::Deferred(Deferred::resolved(Value::Null.into())));
        let err = Document::from_node(Node::Deferred(Deferred::rejected(Value::Null.into())));
        assert!(!deep_equal(&ok, &err));
    }
}
