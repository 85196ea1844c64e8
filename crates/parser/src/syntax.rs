use std::ops::Range;

use pest::iterators::Pair;

#[derive(pest_derive::Parser)]
#[grammar = "slicefold.pest"]
pub struct Parser;

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct Span(pub u32, pub u32);

impl Span {
    pub fn from_range(r: Range<usize>) -> Self {
        Self(r.start as u32, r.end as u32)
    }

    pub fn as_range(&self) -> Range<usize> {
        self.0 as usize..self.1 as usize
    }
}

#[derive(Debug, Clone)]
pub struct Spanned<T> {
    pub span: Span,
    pub inner: T,
}

impl<T> AsRef<T> for Spanned<T> {
    fn as_ref(&self) -> &T {
        &self.inner
    }
}

impl<T, E> FromSyntax<E> for Spanned<T>
where
    T: FromSyntax<E>,
{
    fn from_syntax(node: &mut Node<E>) -> Self {
        let span = node.span;
        let inner = T::from_syntax(node);
        Self { span, inner }
    }
}

pub trait FromSyntax<E> {
    fn from_syntax(node: &mut Node<E>) -> Self;
}

/// A cursor over the children of a parse tree node. Children are taken out
/// by rule, so the order in which a [`FromSyntax`] impl asks for them does
/// not have to follow the grammar.
pub struct Node<'i, E> {
    pub rule: Rule,
    pub txt: &'i str,
    pub span: Span,
    pairs: Vec<Option<Pair<'i, Rule>>>,
    pub errors: Vec<E>,
    child: Option<Box<Self>>,
}

impl<'i, E> Node<'i, E> {
    pub fn new(pair: Pair<'i, Rule>) -> Self {
        let mut n = Self::default();
        n.set_pair(pair);
        n
    }

    fn set_pair(&mut self, pair: Pair<'i, Rule>) {
        self.rule = pair.as_rule();
        self.txt = pair.as_str();
        let s = pair.as_span();
        self.span = Span::from_range(s.start()..s.end());
        self.pairs.clear();
        self.pairs.extend(pair.into_inner().map(Some));
        debug_assert!(self.errors.is_empty());
    }

    fn reset<F>(&mut self, pair: Pair<'i, Rule>, with_errors: F)
    where
        F: FnMut(E),
    {
        self.clear(with_errors);
        self.set_pair(pair);
    }

    fn clear<F>(&mut self, with_errors: F)
    where
        F: FnMut(E),
    {
        self.errors.drain(..).for_each(with_errors);
        self.pairs.clear();
    }

    fn with_child<F, T>(&mut self, pair: Pair<'i, Rule>, f: F) -> T
    where
        F: FnOnce(&mut Self) -> T,
    {
        let mut child = self.child.take().unwrap_or_default();
        child.set_pair(pair);
        let r = f(&mut child);

        child.clear(|err| self.errors.push(err));
        self.child = Some(child);
        r
    }

    pub fn error(&mut self, err: E) {
        self.errors.push(err);
    }

    /// Replaces this node by its only remaining child.
    pub fn descend(&mut self) {
        debug_assert_eq!(self.pairs.len(), 1);
        if let Some(Some(p)) = self.pairs.pop() {
            self.set_pair(p);
        }
    }

    pub fn descend_into_opt<F, T>(&mut self, rule: Rule, f: F) -> Option<T>
    where
        F: FnOnce(&mut Self) -> T,
    {
        let p = self.get_opt(rule)?;
        Some(self.with_child(p, f))
    }

    pub fn single<T: FromSyntax<E>>(&mut self, rule: Rule) -> T {
        let p = self.get(rule);
        self.with_child(p, T::from_syntax)
    }

    pub fn single_opt<T: FromSyntax<E>>(&mut self, rule: Rule) -> Option<T> {
        let p = self.get_opt(rule)?;
        Some(self.with_child(p, T::from_syntax))
    }

    pub fn multi<T: FromSyntax<E>>(&mut self, rule: Rule) -> Vec<T> {
        let mut child = self.child.take().unwrap_or_default();
        let mut errors = vec![];

        // `take` the pairs that match the `rule`, and convert them to T
        let r = self
            .pairs
            .iter_mut()
            .filter_map(|p| {
                if p.as_ref().is_some_and(|p| p.as_rule() == rule) {
                    let p = p.take()?;
                    child.reset(p, |err| errors.push(err));
                    Some(T::from_syntax(&mut child))
                } else {
                    None
                }
            })
            .collect();

        // remove the pairs that were taken
        self.pairs.retain(|p| p.is_some());

        self.errors.append(&mut errors);
        child.clear(|e| self.errors.push(e));
        self.child = Some(child);
        r
    }

    pub fn has(&self, rule: Rule) -> bool {
        self.pairs
            .iter()
            .any(|p| p.as_ref().is_some_and(|p| p.as_rule() == rule))
    }

    pub fn get(&mut self, rule: Rule) -> Pair<'i, Rule> {
        match self.get_opt(rule) {
            Some(p) => p,
            None => panic!(
                "Failed to get {rule:?} inside {:?}, with pairs: {:?}",
                self.rule, self.pairs
            ),
        }
    }

    pub fn get_opt(&mut self, rule: Rule) -> Option<Pair<'i, Rule>> {
        let pos = self
            .pairs
            .iter()
            .position(|p| p.as_ref().is_some_and(|p| p.as_rule() == rule))?;
        self.pairs.remove(pos)
    }

    /// Takes the first remaining child.
    pub fn next_pair(&mut self) -> Option<Pair<'i, Rule>> {
        if self.pairs.is_empty() {
            return None;
        }
        self.pairs.remove(0)
    }

    pub fn str_of(&mut self, rule: Rule) -> Option<&'i str> {
        self.get_opt(rule).map(|p| p.as_str())
    }
}

impl<E> Default for Node<'_, E> {
    fn default() -> Self {
        Self {
            rule: Rule::EOI,
            txt: Default::default(),
            span: Default::default(),
            pairs: vec![],
            errors: vec![],
            child: None,
        }
    }
}
