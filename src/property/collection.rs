/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use std::{
    cell::RefCell,
    fmt,
    io::Write,
    rc::{Rc, Weak},
};

use crate::{
    property::{ChangeListener, ComplexProperty, PropertyCore, Shared},
    update::{PropertyDefinition, ServiceObject},
    xml::{EwsXmlReader, EwsXmlWriter, XmlNamespace, XmlNodeType},
    Error,
};

/// Describes the items a [`ComplexPropertyCollection`] holds and how they map
/// onto XML.
pub trait CollectionSchema {
    type Item: ComplexProperty + 'static;

    /// Creates an empty item for a child element of the collection, or `None`
    /// if the element isn't an item this collection holds.
    fn create_complex_property(&self, xml_element_name: &str) -> Option<Self::Item>;

    /// The element an item is written as.
    fn collection_item_xml_element_name(&self, item: &Self::Item) -> &'static str;

    /// Whether an item freshly created from an update element can stand in for
    /// an existing item.
    fn item_kind_matches(&self, candidate: &Self::Item, existing: &Self::Item) -> bool {
        self.collection_item_xml_element_name(candidate)
            == self.collection_item_xml_element_name(existing)
    }

    /// Whether the collection element is written when it holds no items.
    fn should_write_when_empty(&self) -> bool {
        false
    }

    fn write_item_to_xml<W: Write>(
        &self,
        writer: &mut EwsXmlWriter<W>,
        item: &Self::Item,
    ) -> Result<(), Error> {
        item.write_to_xml(writer, self.collection_item_xml_element_name(item))
    }

    fn validate(&self, items: &[Shared<Self::Item>]) -> Result<(), Error> {
        items.iter().try_for_each(|item| item.borrow().validate())
    }
}

struct ChangeLog<T> {
    added: Vec<Shared<T>>,
    modified: Vec<Shared<T>>,
    removed: Vec<Shared<T>>,
}

impl<T> Default for ChangeLog<T> {
    fn default() -> Self {
        Self {
            added: Vec::new(),
            modified: Vec::new(),
            removed: Vec::new(),
        }
    }
}

fn position_of<T>(list: &[Shared<T>], item: &Shared<T>) -> Option<usize> {
    list.iter().position(|candidate| Rc::ptr_eq(candidate, item))
}

fn remove_from<T>(list: &mut Vec<Shared<T>>, item: &Shared<T>) -> bool {
    match position_of(list, item) {
        Some(index) => {
            list.remove(index);
            true
        }
        None => false,
    }
}

/// The part of a collection its items report changes to.
struct CollectionState<T> {
    core: PropertyCore,
    log: RefCell<ChangeLog<T>>,
}

impl<T> CollectionState<T> {
    fn item_changed(&self, item: &Shared<T>) {
        {
            let mut log = self.log.borrow_mut();
            if position_of(&log.added, item).is_some() {
                // New items are written in full anyway.
                return;
            }

            if position_of(&log.modified, item).is_none() {
                log.modified.push(Rc::clone(item));
            }
        }

        self.core.changed();
    }
}

/// Links an item back to the collection containing it.
struct ItemLink<T> {
    item: Weak<RefCell<T>>,
    collection: Weak<CollectionState<T>>,
}

impl<T> ChangeListener for ItemLink<T> {
    fn property_changed(&self) {
        if let (Some(item), Some(collection)) = (self.item.upgrade(), self.collection.upgrade()) {
            collection.item_changed(&item);
        }
    }
}

/// An ordered collection of complex properties which records which items were
/// added, modified and removed since it was loaded or last saved.
///
/// Items are held as [`Shared`] handles and tracked by identity. Edits made
/// through an item's setters are picked up as long as the item is in the
/// collection. Handles must not be mutably borrowed while the collection is
/// being written or updated.
pub struct ComplexPropertyCollection<S: CollectionSchema> {
    schema: S,
    items: Vec<Shared<S::Item>>,
    state: Rc<CollectionState<S::Item>>,
}

impl<S: CollectionSchema> ComplexPropertyCollection<S> {
    pub fn new(schema: S) -> Self {
        Self {
            schema,
            items: Vec::new(),
            state: Rc::new(CollectionState {
                core: PropertyCore::default(),
                log: RefCell::new(ChangeLog::default()),
            }),
        }
    }

    pub fn schema(&self) -> &S {
        &self.schema
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Shared<S::Item>> {
        self.items.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Shared<S::Item>> {
        self.items.iter()
    }

    pub fn contains(&self, item: &Shared<S::Item>) -> bool {
        self.index_of(item).is_some()
    }

    pub fn index_of(&self, item: &Shared<S::Item>) -> Option<usize> {
        position_of(&self.items, item)
    }

    /// Adds an item, recording it as added. Re-adding an item which was
    /// removed since the last save cancels the removal instead.
    pub fn add(&mut self, item: Shared<S::Item>) -> Result<(), Error> {
        self.internal_add(item, false)
    }

    /// Wraps a new item in a handle and adds it.
    pub fn add_new(&mut self, item: S::Item) -> Shared<S::Item> {
        let item = Rc::new(RefCell::new(item));
        self.attach(&item);
        self.items.push(Rc::clone(&item));
        self.state.log.borrow_mut().added.push(Rc::clone(&item));
        self.changed();

        item
    }

    /// Removes an item. Returns `false` if it wasn't in the collection.
    pub fn remove(&mut self, item: &Shared<S::Item>) -> bool {
        match self.index_of(item) {
            Some(index) => {
                self.detach_at(index);
                true
            }
            None => false,
        }
    }

    pub fn remove_at(&mut self, index: usize) -> Result<Shared<S::Item>, Error> {
        if index >= self.items.len() {
            return Err(Error::IndexOutOfRange {
                index,
                len: self.items.len(),
            });
        }

        Ok(self.detach_at(index))
    }

    /// Removes every item, recording each removal.
    pub fn clear(&mut self) {
        while !self.items.is_empty() {
            self.detach_at(0);
        }
    }

    /// Forgets the pending change of a single item, e.g. once the server
    /// accepted it while other changes in the same batch failed.
    pub fn remove_from_change_log(&mut self, item: &Shared<S::Item>) {
        let mut log = self.state.log.borrow_mut();
        remove_from(&mut log.added, item);
        remove_from(&mut log.modified, item);
        remove_from(&mut log.removed, item);
    }

    pub fn added_items(&self) -> Vec<Shared<S::Item>> {
        self.state.log.borrow().added.clone()
    }

    pub fn modified_items(&self) -> Vec<Shared<S::Item>> {
        self.state.log.borrow().modified.clone()
    }

    pub fn removed_items(&self) -> Vec<Shared<S::Item>> {
        self.state.log.borrow().removed.clone()
    }

    pub fn has_changes(&self) -> bool {
        let log = self.state.log.borrow();
        !(log.added.is_empty() && log.modified.is_empty() && log.removed.is_empty())
    }

    /// Writes one `SetField` operation per added or modified item.
    pub fn write_set_update_to_xml<W: Write>(
        &self,
        writer: &mut EwsXmlWriter<W>,
        object: &ServiceObject,
        property: &PropertyDefinition,
    ) -> Result<(), Error> {
        let pending: Vec<_> = {
            let log = self.state.log.borrow();
            log.added.iter().chain(&log.modified).cloned().collect()
        };

        for item in pending {
            let item = item.borrow();
            if item.write_set_update_to_xml(writer, object, property)? {
                continue;
            }

            writer.write_start_element(XmlNamespace::Types, object.set_field_xml_element_name())?;
            property.write_to_xml(writer)?;
            writer.write_start_element(XmlNamespace::Types, object.xml_element_name())?;
            writer.write_start_element(self.namespace(), property.xml_element_name())?;
            self.schema.write_item_to_xml(writer, &item)?;
            writer.write_end_element()?;
            writer.write_end_element()?;
            writer.write_end_element()?;
        }

        Ok(())
    }

    /// Writes one `DeleteField` operation per removed item.
    pub fn write_delete_update_to_xml<W: Write>(
        &self,
        writer: &mut EwsXmlWriter<W>,
        object: &ServiceObject,
        property: &PropertyDefinition,
    ) -> Result<(), Error> {
        let removed = self.removed_items();

        for item in removed {
            if item.borrow().write_delete_update_to_xml(writer, object)? {
                continue;
            }

            writer.write_start_element(
                XmlNamespace::Types,
                object.delete_field_xml_element_name(),
            )?;
            property.write_to_xml(writer)?;
            writer.write_end_element()?;
        }

        Ok(())
    }

    /// Writes every pending change: sets for added and modified items, then
    /// deletes for removed ones.
    pub fn write_update_to_xml<W: Write>(
        &self,
        writer: &mut EwsXmlWriter<W>,
        object: &ServiceObject,
        property: &PropertyDefinition,
    ) -> Result<(), Error> {
        self.write_set_update_to_xml(writer, object, property)?;
        self.write_delete_update_to_xml(writer, object, property)
    }

    fn internal_add(&mut self, item: Shared<S::Item>, loading: bool) -> Result<(), Error> {
        if self.contains(&item) {
            return Err(Error::DuplicateItem);
        }

        self.attach(&item);
        self.items.push(Rc::clone(&item));

        if !loading {
            {
                let mut log = self.state.log.borrow_mut();
                if !remove_from(&mut log.removed, &item) {
                    log.added.push(item);
                }
            }

            self.changed();
        }

        Ok(())
    }

    fn detach_at(&mut self, index: usize) -> Shared<S::Item> {
        let item = self.items.remove(index);
        item.borrow().core().notifier().set_owner(None);

        {
            let mut log = self.state.log.borrow_mut();
            if !remove_from(&mut log.added, &item) {
                log.removed.push(Rc::clone(&item));
            }
            remove_from(&mut log.modified, &item);
        }

        self.changed();
        item
    }

    fn attach(&self, item: &Shared<S::Item>) {
        let link: Rc<dyn ChangeListener> = Rc::new(ItemLink {
            item: Rc::downgrade(item),
            collection: Rc::downgrade(&self.state),
        });
        item.borrow().core().notifier().set_owner(Some(link));
    }
}

impl<S: CollectionSchema> ComplexProperty for ComplexPropertyCollection<S> {
    fn core(&self) -> &PropertyCore {
        &self.state.core
    }

    /// Appends the items in the element without recording them as added.
    fn load_from_xml_ns(
        &mut self,
        reader: &mut EwsXmlReader<'_>,
        namespace: XmlNamespace,
        local_name: &str,
    ) -> Result<(), Error> {
        reader.ensure_current_node_is_start_element(namespace, local_name)?;
        if reader.is_empty_element() {
            return reader.read();
        }

        loop {
            reader.read()?;

            match reader.node_type() {
                XmlNodeType::StartElement => {
                    let item_name = reader.local_name().to_owned();
                    match self.schema.create_complex_property(&item_name) {
                        Some(mut item) => {
                            item.load_from_xml(reader, &item_name)?;
                            self.internal_add(Rc::new(RefCell::new(item)), true)?;
                        }
                        None => {
                            log::debug!(
                                "skipping unrecognized element `{item_name}` in collection `{local_name}`"
                            );
                            reader.skip_current_element()?;
                        }
                    }
                }
                XmlNodeType::EndOfDocument => return Err(Error::UnexpectedEndOfDocument),
                _ => {}
            }

            if reader.is_end_element(namespace, local_name) {
                return Ok(());
            }
        }
    }

    /// Patches existing items from a server response.
    ///
    /// Items are matched by position: the n-th child element updates the n-th
    /// item of the collection. This relies on the server echoing items in the
    /// order they were sent.
    fn update_from_xml_ns(
        &mut self,
        reader: &mut EwsXmlReader<'_>,
        namespace: XmlNamespace,
        local_name: &str,
    ) -> Result<(), Error> {
        reader.ensure_current_node_is_start_element(namespace, local_name)?;
        if reader.is_empty_element() {
            return reader.read();
        }

        let mut index = 0;
        loop {
            reader.read()?;

            match reader.node_type() {
                XmlNodeType::StartElement => {
                    let item_name = reader.local_name().to_owned();
                    let Some(existing) = self.items.get(index).cloned() else {
                        log::warn!(
                            "update of collection `{local_name}` has more elements than the {} items it holds",
                            self.items.len()
                        );
                        return Err(Error::IndexOutOfRange {
                            index,
                            len: self.items.len(),
                        });
                    };
                    index += 1;

                    let compatible = self
                        .schema
                        .create_complex_property(&item_name)
                        .is_some_and(|candidate| {
                            self.schema.item_kind_matches(&candidate, &existing.borrow())
                        });
                    if !compatible {
                        let expected = self
                            .schema
                            .collection_item_xml_element_name(&existing.borrow())
                            .to_owned();
                        log::warn!(
                            "element `{item_name}` can't update item {} (`{expected}`) of collection `{local_name}`",
                            index - 1
                        );
                        return Err(Error::PropertyTypeIncompatible {
                            expected,
                            found: item_name,
                        });
                    }

                    existing.borrow_mut().update_from_xml(reader, &item_name)?;
                }
                XmlNodeType::EndOfDocument => return Err(Error::UnexpectedEndOfDocument),
                _ => {}
            }

            if reader.is_end_element(namespace, local_name) {
                return Ok(());
            }
        }
    }

    /// Writes the collection element and its items. Nothing is written for an
    /// empty collection unless the schema asks for it.
    fn write_to_xml_ns<W: Write>(
        &self,
        writer: &mut EwsXmlWriter<W>,
        namespace: XmlNamespace,
        local_name: &str,
    ) -> Result<(), Error> {
        if self.items.is_empty() && !self.schema.should_write_when_empty() {
            return Ok(());
        }

        writer.write_start_element(namespace, local_name)?;
        self.write_attributes_to_xml(writer)?;
        self.write_elements_to_xml(writer)?;
        writer.write_end_element()
    }

    fn write_elements_to_xml<W: Write>(&self, writer: &mut EwsXmlWriter<W>) -> Result<(), Error> {
        for item in &self.items {
            self.schema.write_item_to_xml(writer, &item.borrow())?;
        }

        Ok(())
    }

    fn clear_change_log(&mut self) {
        log::debug!("clearing change log of collection with {} items", self.items.len());

        *self.state.log.borrow_mut() = ChangeLog::default();
        for item in &self.items {
            item.borrow_mut().clear_change_log();
        }
    }

    fn validate(&self) -> Result<(), Error> {
        self.schema.validate(&self.items)
    }
}

impl<S: CollectionSchema + Default> Default for ComplexPropertyCollection<S> {
    fn default() -> Self {
        Self::new(S::default())
    }
}

impl<S: CollectionSchema> fmt::Debug for ComplexPropertyCollection<S>
where
    S::Item: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.items.iter()).finish()
    }
}
