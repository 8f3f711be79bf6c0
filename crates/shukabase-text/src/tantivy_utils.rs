use tantivy::schema::{IndexRecordOption, Schema, TextFieldIndexing, TextOptions, INDEXED, STORED, STRING};
use tantivy::tokenizer::{Language as StemLanguage, LowerCaser, RemoveLongFilter, SimpleTokenizer, Stemmer, StopWordFilter, TextAnalyzer};
use tantivy::Index;

use shukabase_core::Language;

pub const ORDINAL_FIELD: &str = "ordinal";
pub const BOOK_FIELD: &str = "book";
pub const CHAPTER_FIELD: &str = "chapter";
pub const CHUNK_INDEX_FIELD: &str = "chunk_index";
pub const TEXT_FIELD: &str = "text";

const ENGLISH_STOP_WORDS: &[&str] = &[
	"a","an","and","are","as","at","be","by","for","from","has","he","in","is","it","its","of","on","that","the","to","was","will","with","or","but","not","this","these","they","them","their","there","then","than","so","if","when","where","why","how","what","which","who","whom","whose","can","could","should","would","may","might","must","shall","do","does","did","have","had","having",
];

const RUSSIAN_STOP_WORDS: &[&str] = &[
	"и","в","во","не","что","он","на","я","с","со","как","а","то","все","она","так","его","но","да","ты","к","у","же","вы","за","бы","по","только","ее","мне","было","вот","от","меня","еще","нет","о","из","ему","теперь","когда","даже","ну","ли","если","уже","или","ни","быть","был","него","до","вас","нибудь","уж","вам","ведь","там","потом","себя","ей","может","они","тут","где","есть","надо","ней","для","мы","тебя","их","чем","была","сам","чтоб","без","будто","чего","раз","тоже","себе","под","будет","ж","тогда","кто","этот","того","потому","этого","какой","ним","здесь","этом","один","мой","тем","чтобы","нее","были","куда","зачем","всех","можно","при","об","хоть","над","больше","тот","через","эти","нас","про","всего","них","какая","много","разве","три","эту","моя","свою","этой","перед","лучше","чуть","том","такой","им","более","всегда","конечно","всю","между",
];

/// Analyzer name registered on the index for `language`.
pub fn analyzer_name(language: Language) -> String {
	format!("scripture_{}", language.code())
}

pub fn build_schema(language: Language) -> Schema {
	let mut schema_builder = Schema::builder();
	let _ordinal_field = schema_builder.add_u64_field(ORDINAL_FIELD, INDEXED | STORED);
	let _book_field = schema_builder.add_text_field(BOOK_FIELD, STRING | STORED);
	let _chapter_field = schema_builder.add_text_field(CHAPTER_FIELD, STRING | STORED);
	let _chunk_index_field = schema_builder.add_u64_field(CHUNK_INDEX_FIELD, STORED);
	let text_field_indexing = TextFieldIndexing::default().set_tokenizer(&analyzer_name(language)).set_index_option(IndexRecordOption::WithFreqsAndPositions);
	let text_options = TextOptions::default().set_indexing_options(text_field_indexing);
	let _text_field = schema_builder.add_text_field(TEXT_FIELD, text_options);
	schema_builder.build()
}

/// Lowercase, drop stop words, then stem with the language's Snowball stemmer.
pub fn build_analyzer(language: Language) -> TextAnalyzer {
	let (stop_words, stem) = match language {
		Language::Ru => (RUSSIAN_STOP_WORDS, StemLanguage::Russian),
		Language::En => (ENGLISH_STOP_WORDS, StemLanguage::English),
	};
	TextAnalyzer::builder(SimpleTokenizer::default())
		.filter(RemoveLongFilter::limit(40))
		.filter(LowerCaser)
		.filter(StopWordFilter::remove(stop_words.iter().map(|s| s.to_string())))
		.filter(Stemmer::new(stem))
		.build()
}

pub fn register_tokenizer(index: &Index, language: Language) {
	index.tokenizers().register(&analyzer_name(language), build_analyzer(language));
}
